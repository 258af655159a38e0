//! Error types for fairdl
//!
//! One task's error never aborts the scheduler: admission and dispatch handle
//! failures locally, and a failed external operation surfaces as a single
//! `Failed` transition on the task that hit it. Cancellation is a task state,
//! not an error variant.

use crate::types::{TaskId, TaskState};
use thiserror::Error;

/// Result type alias for fairdl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fairdl
#[derive(Debug, Error)]
pub enum Error {
    /// A state change violating the forward-only task lifecycle.
    ///
    /// This indicates a programming or race defect and never surfaces to a
    /// user; the pipeline logs it and forces the affected task to `Failed`.
    #[error("invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        /// Task the transition was attempted on
        id: TaskId,
        /// State the task was in
        from: TaskState,
        /// State the transition asked for
        to: TaskState,
    },

    /// Unknown task id passed to `status`/`cancel` — benign, reported to the caller
    #[error("task not found: {0}")]
    NotFound(String),

    /// Input that does not parse as a `DL-XXXX` task identifier
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// External download operation failed
    #[error("download failed: {0}")]
    Fetch(String),

    /// External upload/delivery operation failed
    #[error("upload failed: {0}")]
    Upload(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_active_per_user")
        key: Option<String>,
    },

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new submissions")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn invalid_transition_message_names_states() {
        let err = Error::InvalidTransition {
            id: TaskId::from_str("DL-AAAA").unwrap(),
            from: TaskState::Completed,
            to: TaskState::Downloading,
        };
        let msg = err.to_string();
        assert!(msg.contains("DL-AAAA"), "message should name the task: {msg}");
        assert!(
            msg.contains("completed") && msg.contains("downloading"),
            "message should name both states: {msg}"
        );
    }

    #[test]
    fn fetch_error_carries_captured_reason() {
        let err = Error::Fetch("exit status 1".to_string());
        assert_eq!(err.to_string(), "download failed: exit status 1");
    }
}
