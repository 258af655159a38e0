//! Core types for fairdl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix carried by every task identifier.
pub const TASK_ID_PREFIX: &str = "DL-";

/// Length of the random suffix following the prefix.
pub const TASK_ID_SUFFIX_LEN: usize = 4;

/// Unique identifier for a task, e.g. `DL-A3X9`.
///
/// Identifiers are short and human-readable so users can quote them back
/// verbatim in a cancel command. The suffix alphabet is uppercase `A-Z0-9`;
/// parsing is case-insensitive and normalizes to uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Construct from a suffix already drawn from the id alphabet.
    pub(crate) fn from_suffix(suffix: &str) -> Self {
        Self(format!("{TASK_ID_PREFIX}{suffix}"))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let valid = normalized.len() == TASK_ID_PREFIX.len() + TASK_ID_SUFFIX_LEN
            && normalized.starts_with(TASK_ID_PREFIX)
            && normalized[TASK_ID_PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if valid {
            Ok(Self(normalized))
        } else {
            Err(crate::error::Error::InvalidTaskId(s.to_string()))
        }
    }
}

/// Opaque identifier of the user who submitted a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters of one media-fetch request.
///
/// Opaque to the scheduling core beyond being handed to the
/// [`MediaFetcher`](crate::external::MediaFetcher).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL of the media to fetch
    pub url: String,

    /// Requested quality/resolution (e.g. "1080"), or None for best available
    #[serde(default)]
    pub quality: Option<String>,

    /// Output container format (e.g. "mp4" or "mkv")
    pub output_format: String,
}

/// Lifecycle state of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting for a free slot
    Queued,
    /// Download phase in progress
    Downloading,
    /// Upload/delivery phase in progress
    Uploading,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled by the user
    Cancelled,
}

impl TaskState {
    /// True for `Completed`, `Failed`, and `Cancelled` — no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// True while the task occupies one of its owner's slots.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Downloading | TaskState::Uploading)
    }

    /// Whether `self -> to` is a valid forward transition.
    ///
    /// The lifecycle is strictly monotonic:
    /// `Queued -> Downloading -> Uploading -> Completed`, with `Failed` and
    /// `Cancelled` reachable from any non-terminal state.
    pub fn can_transition_to(&self, to: TaskState) -> bool {
        match (self, to) {
            (TaskState::Queued, TaskState::Downloading) => true,
            (TaskState::Downloading, TaskState::Uploading) => true,
            (TaskState::Uploading, TaskState::Completed) => true,
            (from, TaskState::Failed | TaskState::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Downloading => "downloading",
            TaskState::Uploading => "uploading",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Pipeline phase a progress update belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Download phase
    Downloading,
    /// Upload phase
    Uploading,
}

/// Last known progress of a task's current phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Bytes transferred so far
    pub bytes_done: u64,

    /// Total bytes expected (0 when the collaborator doesn't know yet)
    pub bytes_total: u64,

    /// Instantaneous speed in bytes per second, computed from the delta
    /// against the previous emitted sample
    pub speed_bps: u64,

    /// Estimated seconds to completion (None when the speed is zero)
    pub eta_seconds: Option<u64>,
}

/// Public snapshot of a task, as returned by `status()`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task identifier
    pub id: TaskId,

    /// Submitting user
    pub owner: UserId,

    /// Current lifecycle state
    pub state: TaskState,

    /// Last progress snapshot (None before the first emitted sample)
    pub progress: Option<Progress>,

    /// When the task was submitted
    pub created_at: DateTime<Utc>,

    /// When the task left the queue (None while still queued)
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    pub ended_at: Option<DateTime<Utc>>,

    /// Captured failure reason (set only in `Failed`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Event emitted during a task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task admitted but waiting for a free slot
    Queued {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
        /// 1-based position in the owner's wait list
        position: usize,
    },

    /// Task entered the download phase (immediately or by promotion)
    Started {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
    },

    /// Throttled progress update
    Progress {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
        /// Phase the sample belongs to
        phase: Phase,
        /// Computed snapshot
        progress: Progress,
    },

    /// Download finished, upload phase started
    Uploading {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
    },

    /// Task finished successfully
    Completed {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
    },

    /// Task failed
    Failed {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
        /// Captured reason
        reason: String,
    },

    /// Task cancelled by the user
    Cancelled {
        /// Task identifier
        id: TaskId,
        /// Submitting user
        owner: UserId,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Scheduler-wide queue statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks currently in `Downloading` or `Uploading`
    pub active: usize,

    /// Tasks currently waiting in `Queued`
    pub queued: usize,

    /// Distinct users with at least one active task
    pub active_users: usize,

    /// Distinct users with at least one queued task
    pub waiting_users: usize,

    /// Whether new submissions are accepted (false once shutdown begins)
    pub accepting_new: bool,
}
