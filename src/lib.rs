//! # fairdl
//!
//! Fair, capped scheduling for chat-driven media download jobs.
//!
//! fairdl sits between a chat frontend (commands like "download this URL")
//! and the tools that do the actual work. It admits every request, holds each
//! user to a small number of simultaneously running tasks, shares freed slots
//! round-robin across waiting users, and drives each admitted task through a
//! download phase and an upload/delivery phase with throttled progress
//! updates along the way.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Bring your own I/O** - Downloads, uploads, and user messaging live
//!   behind traits implemented by the embedding application
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Never lose a request** - Over-cap submissions queue, they are not
//!   rejected
//!
//! ## Quick Start
//!
//! ```no_run
//! use fairdl::{
//!     Config, DownloadRequest, DownloadedFile, Destination, MediaFetcher,
//!     MediaScheduler, MediaUploader, Notification, Notifier, ProgressSender,
//!     Result, UserId,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct MyFetcher;
//!
//! #[async_trait::async_trait]
//! impl MediaFetcher for MyFetcher {
//!     async fn fetch(
//!         &self,
//!         request: &DownloadRequest,
//!         progress: ProgressSender,
//!         cancel: CancellationToken,
//!     ) -> Result<DownloadedFile> {
//!         // Run the real download tool here.
//!         todo!()
//!     }
//! }
//!
//! struct MyUploader;
//!
//! #[async_trait::async_trait]
//! impl MediaUploader for MyUploader {
//!     async fn upload(
//!         &self,
//!         owner: UserId,
//!         file: &DownloadedFile,
//!         destination: Destination,
//!         progress: ProgressSender,
//!         cancel: CancellationToken,
//!     ) -> Result<()> {
//!         // Deliver the artifact to the chat surface or external storage.
//!         todo!()
//!     }
//! }
//!
//! struct MyNotifier;
//!
//! #[async_trait::async_trait]
//! impl Notifier for MyNotifier {
//!     async fn notify(&self, user: UserId, update: Notification) {
//!         // Render the update as a chat message.
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scheduler = MediaScheduler::new(
//!         Config::default(),
//!         Arc::new(MyFetcher),
//!         Arc::new(MyUploader),
//!         Arc::new(MyNotifier),
//!     )?;
//!
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             tracing::info!(?event, "task event");
//!         }
//!     });
//!
//!     let id = scheduler
//!         .submit(
//!             UserId(42),
//!             DownloadRequest {
//!                 url: "https://example.com/show/episode-1".to_string(),
//!                 quality: Some("1080".to_string()),
//!                 output_format: "mp4".to_string(),
//!             },
//!         )
//!         .await?;
//!     println!("submitted {id}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Traits for the external download/upload/notification collaborators
pub mod external;
/// Progress throttling and speed/ETA computation
pub mod progress;
/// Core scheduler implementation (decomposed into focused submodules)
pub mod scheduler;
/// Core types and events
pub mod types;

mod registry;

// Re-export commonly used types
pub use config::{Config, DeliveryConfig, LimitsConfig, ProgressConfig};
pub use error::{Error, Result};
pub use external::{
    Destination, DownloadedFile, MediaFetcher, MediaUploader, Notification, Notifier,
    ProgressSample, ProgressSender,
};
pub use progress::ProgressReporter;
pub use scheduler::MediaScheduler;
pub use types::{
    DownloadRequest, Event, Phase, Progress, QueueStats, TaskId, TaskInfo, TaskState, UserId,
};

/// Helper function to run the scheduler with graceful signal handling.
///
/// Waits for a termination signal and then calls the scheduler's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// # use fairdl::{MediaScheduler, run_with_shutdown};
/// # async fn example(scheduler: MediaScheduler) {
/// run_with_shutdown(scheduler).await;
/// # }
/// ```
pub async fn run_with_shutdown(scheduler: MediaScheduler) {
    wait_for_signal().await;
    scheduler.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
        }
        (Err(_), Err(_)) => {
            tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
