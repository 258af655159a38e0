//! External collaborator seams.
//!
//! The scheduling core never performs byte-level downloads, chat uploads, or
//! message rendering itself. Those live behind the traits here, implemented by
//! the embedding application (e.g. a bot wrapping an HLS download binary and a
//! chat client). Each long-running operation receives a progress channel and a
//! cancellation token; implementations are expected to stop within a bounded
//! time after the token fires.

use crate::error::Result;
use crate::types::{DownloadRequest, Phase, Progress, TaskId, UserId};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One raw progress sample from a collaborator.
///
/// Samples may arrive at any rate; the core throttles before anything reaches
/// the notification sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressSample {
    /// Bytes transferred so far
    pub bytes_done: u64,
    /// Total bytes expected (0 if unknown)
    pub bytes_total: u64,
}

/// Channel end collaborators push [`ProgressSample`]s into.
pub type ProgressSender = mpsc::Sender<ProgressSample>;

/// Local artifact produced by a successful download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Path of the artifact on local disk
    pub path: PathBuf,
    /// Size in bytes, used by the delivery routing policy
    pub size_bytes: u64,
}

/// Where a finished artifact is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Direct upload to the chat surface
    Chat,
    /// Alternate external storage for artifacts above the direct-delivery limit
    ExternalStorage,
}

/// External fetch tool (e.g. an HLS downloader binary wrapper).
#[async_trait::async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the requested media, pushing raw progress samples into
    /// `progress` and stopping promptly once `cancel` fires.
    async fn fetch(
        &self,
        request: &DownloadRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile>;
}

/// Delivery of a downloaded artifact to the user.
#[async_trait::async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload `file` for `owner` to the chosen destination, with the same
    /// progress/cancellation wiring as [`MediaFetcher::fetch`].
    async fn upload(
        &self,
        owner: UserId,
        file: &DownloadedFile,
        destination: Destination,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Status update pushed to the user-facing surface.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// Task admitted but waiting for a free slot
    Queued {
        /// Task identifier
        id: TaskId,
        /// 1-based position in the owner's wait list
        position: usize,
    },

    /// Throttled progress snapshot for a running task
    Progress {
        /// Task identifier
        id: TaskId,
        /// Phase the snapshot belongs to
        phase: Phase,
        /// Computed snapshot
        progress: Progress,
    },

    /// Task finished successfully
    Completed {
        /// Task identifier
        id: TaskId,
    },

    /// Task failed with a captured reason
    Failed {
        /// Task identifier
        id: TaskId,
        /// Captured reason
        reason: String,
    },

    /// Task cancelled (neutral status, not a failure)
    Cancelled {
        /// Task identifier
        id: TaskId,
    },
}

/// Push sink for user-facing status messages.
///
/// The core calls this fire-and-forget from spawned tasks; a slow or failing
/// sink never blocks scheduling or progress handling.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one status update to `user`.
    async fn notify(&self, user: UserId, update: Notification);
}
