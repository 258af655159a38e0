//! The per-task download/upload pipeline.
//!
//! Each admitted task runs in its own spawned tokio task. The pipeline drives
//! the two external collaborators, forwards throttled progress, honors the
//! cancellation token between and during phases, and performs exactly one
//! terminal transition followed by exactly one slot release.

use super::MediaScheduler;
use crate::external::{Destination, DownloadedFile, Notification, ProgressSample};
use crate::progress::ProgressReporter;
use crate::types::{Event, Phase, TaskId, TaskState, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel capacity for raw progress samples per phase.
///
/// Collaborators may push faster than the pump consumes; a bounded channel
/// applies backpressure instead of growing without bound.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Everything one spawned pipeline needs, owned by value.
struct TaskContext {
    id: TaskId,
    owner: UserId,
    scheduler: MediaScheduler,
    cancel: CancellationToken,
}

/// How a pipeline ended. Maps 1:1 onto the terminal transition in `finish`.
enum TaskOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl MediaScheduler {
    /// Spawn the execution pipeline for a task already transitioned to
    /// `Downloading`.
    pub(crate) fn spawn_pipeline(&self, id: TaskId, owner: UserId, cancel: CancellationToken) {
        let ctx = TaskContext {
            id,
            owner,
            scheduler: self.clone(),
            cancel,
        };
        tokio::spawn(async move {
            ctx.run().await;
        });
    }
}

impl TaskContext {
    async fn run(self) {
        let request = {
            let state = self.scheduler.state.lock().await;
            state.registry.get(&self.id).map(|t| t.request.clone())
        };
        let Some(request) = request else {
            // A task is never pruned while active; reaching here is a defect.
            tracing::error!(task_id = %self.id, "pipeline started for unknown task");
            self.scheduler.release(&self.id).await;
            return;
        };

        let outcome = self.run_phases(&request).await;
        self.finish(outcome).await;
    }

    /// Run download then upload, returning how the task ended.
    async fn run_phases(&self, request: &crate::types::DownloadRequest) -> TaskOutcome {
        tracing::info!(task_id = %self.id, user_id = self.owner.0, url = %request.url, "download phase started");

        let (tx, rx) = mpsc::channel::<ProgressSample>(PROGRESS_CHANNEL_CAPACITY);
        let pump = self.spawn_progress_pump(Phase::Downloading, rx);

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => {
                drop(pump);
                return TaskOutcome::Cancelled;
            }
            res = self.scheduler.fetcher.fetch(request, tx, self.cancel.clone()) => res,
        };

        let file = match fetched {
            Ok(file) => file,
            Err(_) if self.cancel.is_cancelled() => return TaskOutcome::Cancelled,
            Err(e) => {
                tracing::warn!(task_id = %self.id, error = %e, "download phase failed");
                return TaskOutcome::Failed(e.to_string());
            }
        };

        // Cancellation between phases is honored before any upload work.
        if self.cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }

        {
            let mut state = self.scheduler.state.lock().await;
            if let Err(e) = state.registry.transition(&self.id, TaskState::Uploading) {
                tracing::error!(task_id = %self.id, error = %e, "could not enter upload phase");
                return TaskOutcome::Failed(e.to_string());
            }
        }
        self.scheduler.emit_event(Event::Uploading {
            id: self.id.clone(),
            owner: self.owner,
        });

        self.run_upload(&file).await
    }

    async fn run_upload(&self, file: &DownloadedFile) -> TaskOutcome {
        let destination = if file.size_bytes > self.scheduler.config.delivery.direct_limit_bytes {
            Destination::ExternalStorage
        } else {
            Destination::Chat
        };
        tracing::info!(
            task_id = %self.id,
            size_bytes = file.size_bytes,
            ?destination,
            "upload phase started"
        );

        let (tx, rx) = mpsc::channel::<ProgressSample>(PROGRESS_CHANNEL_CAPACITY);
        let pump = self.spawn_progress_pump(Phase::Uploading, rx);

        let uploaded = tokio::select! {
            _ = self.cancel.cancelled() => {
                drop(pump);
                return TaskOutcome::Cancelled;
            }
            res = self.scheduler.uploader.upload(
                self.owner,
                file,
                destination,
                tx,
                self.cancel.clone(),
            ) => res,
        };

        match uploaded {
            Ok(()) => TaskOutcome::Completed,
            Err(_) if self.cancel.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => {
                tracing::warn!(task_id = %self.id, error = %e, "upload phase failed");
                TaskOutcome::Failed(e.to_string())
            }
        }
    }

    /// Consume raw samples for one phase, forwarding the snapshots that
    /// survive throttling. Ends when the phase drops its sender.
    fn spawn_progress_pump(
        &self,
        phase: Phase,
        mut rx: mpsc::Receiver<ProgressSample>,
    ) -> tokio::task::JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        let id = self.id.clone();
        let owner = self.owner;
        let min_interval = scheduler.config.progress.min_update_interval;

        tokio::spawn(async move {
            let mut reporter = ProgressReporter::new(min_interval);
            while let Some(sample) = rx.recv().await {
                let Some(progress) = reporter.report(sample.bytes_done, sample.bytes_total) else {
                    continue;
                };

                {
                    let mut state = scheduler.state.lock().await;
                    match state.registry.get_mut(&id) {
                        Some(task) if !task.state.is_terminal() => {
                            task.progress = Some(progress);
                        }
                        // Late samples after the terminal transition are dropped.
                        _ => continue,
                    }
                }

                scheduler.emit_event(Event::Progress {
                    id: id.clone(),
                    owner,
                    phase,
                    progress,
                });
                scheduler.spawn_notify(
                    owner,
                    Notification::Progress {
                        id: id.clone(),
                        phase,
                        progress,
                    },
                );
            }
        })
    }

    /// Apply the terminal transition, announce it, and release the slot.
    async fn finish(&self, outcome: TaskOutcome) {
        let (terminal, reason) = match outcome {
            TaskOutcome::Completed => (TaskState::Completed, None),
            TaskOutcome::Failed(reason) => (TaskState::Failed, Some(reason)),
            TaskOutcome::Cancelled => (TaskState::Cancelled, None),
        };

        let transitioned = {
            let mut state = self.scheduler.state.lock().await;
            match state.registry.transition(&self.id, terminal) {
                Ok(task) => {
                    task.failure_reason = reason.clone();
                    true
                }
                Err(e) => {
                    tracing::error!(task_id = %self.id, error = %e, "terminal transition rejected");
                    false
                }
            }
        };
        if !transitioned {
            self.scheduler.release(&self.id).await;
            return;
        }

        match terminal {
            TaskState::Completed => {
                tracing::info!(task_id = %self.id, user_id = self.owner.0, "task completed");
                self.scheduler.emit_event(Event::Completed {
                    id: self.id.clone(),
                    owner: self.owner,
                });
                self.scheduler
                    .spawn_notify(self.owner, Notification::Completed {
                        id: self.id.clone(),
                    });
            }
            TaskState::Failed => {
                let reason = reason.unwrap_or_else(|| "unknown error".to_string());
                tracing::warn!(task_id = %self.id, user_id = self.owner.0, reason = %reason, "task failed");
                self.scheduler.emit_event(Event::Failed {
                    id: self.id.clone(),
                    owner: self.owner,
                    reason: reason.clone(),
                });
                self.scheduler.spawn_notify(
                    self.owner,
                    Notification::Failed {
                        id: self.id.clone(),
                        reason,
                    },
                );
            }
            _ => {
                tracing::info!(task_id = %self.id, user_id = self.owner.0, "task cancelled");
                self.scheduler.emit_event(Event::Cancelled {
                    id: self.id.clone(),
                    owner: self.owner,
                });
                self.scheduler
                    .spawn_notify(self.owner, Notification::Cancelled {
                        id: self.id.clone(),
                    });
            }
        }

        self.scheduler.release(&self.id).await;
    }
}
