//! Core scheduler implementation split into focused submodules.
//!
//! The `MediaScheduler` struct and its methods are organized by domain:
//! - [`admission`] - Task submission and slot release
//! - [`dispatch`] - Round-robin promotion of waiting tasks
//! - [`control`] - Cancellation, status queries, and shutdown
//! - [`execution`] - The download/upload pipeline run per task

mod admission;
mod control;
mod dispatch;
mod execution;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::Result;
use crate::external::{MediaFetcher, MediaUploader, Notifier};
use crate::registry::TaskRegistry;
use crate::types::{Event, TaskId, UserId};
use std::collections::{HashMap, VecDeque};

/// Everything the scheduler mutates, behind one lock.
///
/// A single mutex keeps admission, promotion, cancellation, and terminal
/// bookkeeping serialized, which is what makes the cap and fairness
/// invariants straightforward to maintain. The lock is only ever held for
/// short synchronous sections; no `.await` happens while it is held, and all
/// notification/event side effects are spawned after it is released.
pub(crate) struct SchedulerState {
    /// Authoritative id -> task map
    pub(crate) registry: TaskRegistry,
    /// Per-user FIFO of queued task ids
    pub(crate) waiting: HashMap<UserId, VecDeque<TaskId>>,
    /// Round-robin order over users that currently have queued tasks
    pub(crate) rotation: VecDeque<UserId>,
    /// Cancellation tokens for tasks with a running pipeline
    pub(crate) cancel_tokens: HashMap<TaskId, tokio_util::sync::CancellationToken>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            waiting: HashMap::new(),
            rotation: VecDeque::new(),
            cancel_tokens: HashMap::new(),
        }
    }

    /// Drop `id` from its owner's wait list, clearing empty bookkeeping.
    pub(crate) fn remove_from_waiting(&mut self, owner: UserId, id: &TaskId) {
        if let Some(queue) = self.waiting.get_mut(&owner) {
            queue.retain(|queued| queued != id);
            if queue.is_empty() {
                self.waiting.remove(&owner);
                self.rotation.retain(|u| *u != owner);
            }
        }
    }
}

/// Main scheduler instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaScheduler {
    /// All mutable scheduling state behind the single coordination lock
    pub(crate) state: std::sync::Arc<tokio::sync::Mutex<SchedulerState>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// External download collaborator
    pub(crate) fetcher: std::sync::Arc<dyn MediaFetcher>,
    /// External delivery collaborator
    pub(crate) uploader: std::sync::Arc<dyn MediaUploader>,
    /// User-facing status message sink
    pub(crate) notifier: std::sync::Arc<dyn Notifier>,
    /// Flag to indicate whether new submissions are accepted (set to false during shutdown)
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MediaScheduler {
    /// Create a new MediaScheduler instance
    ///
    /// Validates the configuration, sets up the event broadcast channel, and
    /// wires in the three external collaborators. The scheduler starts empty
    /// and accepting submissions; there is no background loop to start, all
    /// work happens in tasks spawned per submission.
    pub fn new(
        config: Config,
        fetcher: std::sync::Arc<dyn MediaFetcher>,
        uploader: std::sync::Arc<dyn MediaUploader>,
        notifier: std::sync::Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.event_buffer);

        Ok(Self {
            state: std::sync::Arc::new(tokio::sync::Mutex::new(SchedulerState::new())),
            event_tx,
            config: std::sync::Arc::new(config),
            fetcher,
            uploader,
            notifier,
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        })
    }

    /// Subscribe to task lifecycle events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently. Events are buffered; a subscriber that falls behind by
    /// more than the configured buffer receives a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use fairdl::MediaScheduler;
    /// # async fn example(scheduler: MediaScheduler) {
    /// let mut events = scheduler.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "task event");
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone.
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped
    /// (ok() converts Err to None). Scheduling never depends on anyone
    /// listening.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Fire-and-forget delivery of one user-facing status message.
    ///
    /// Spawned so a slow notification sink never blocks the caller, and
    /// always called after the state lock has been released.
    pub(crate) fn spawn_notify(&self, user: UserId, update: crate::external::Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier.notify(user, update).await;
        });
    }
}
