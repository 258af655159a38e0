//! Task submission and slot release.

use super::MediaScheduler;
use crate::error::{Error, Result};
use crate::external::Notification;
use crate::types::{DownloadRequest, Event, TaskId, TaskState, UserId};
use std::sync::atomic::Ordering;

impl MediaScheduler {
    /// Submit a new download request for `owner`.
    ///
    /// Admission never rejects for load. If the owner is under their
    /// concurrency cap, the global cap has room, and the owner has nothing
    /// already waiting, the task starts immediately; otherwise it joins the
    /// owner's FIFO wait list and the returned id can be used to query or
    /// cancel it. The only rejection is [`Error::ShuttingDown`] once graceful
    /// shutdown has begun.
    pub async fn submit(&self, owner: UserId, request: DownloadRequest) -> Result<TaskId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let url = request.url.clone();
        let mut state = self.state.lock().await;

        // Re-check under the lock: shutdown sets the flag before draining, so
        // a submit that raced past the first check is still turned away here.
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        // Duplicate URLs are allowed (resubmission is a valid user intent)
        // but worth a trace for operators debugging double-submits.
        if let Some(existing) = state.registry.find_duplicate(owner, &url) {
            tracing::warn!(
                user_id = owner.0,
                task_id = %existing.id,
                url = %url,
                "duplicate submission for an already-tracked URL"
            );
        }

        let task = state.registry.create(owner, request);
        let id = task.id.clone();

        let owner_active = state.registry.active_count_for(owner);
        let owner_has_waiting = state.waiting.get(&owner).is_some_and(|q| !q.is_empty());
        let start_now = !owner_has_waiting
            && owner_active < self.config.limits.max_active_per_user
            && state.registry.active_total() < self.config.limits.max_active_global;

        if start_now {
            // Freshly created tasks are Queued, so this cannot fail.
            state.registry.transition(&id, TaskState::Downloading)?;
            let cancel = tokio_util::sync::CancellationToken::new();
            state.cancel_tokens.insert(id.clone(), cancel.clone());
            drop(state);

            tracing::info!(task_id = %id, user_id = owner.0, "task admitted, starting immediately");
            self.emit_event(Event::Started {
                id: id.clone(),
                owner,
            });
            self.spawn_pipeline(id.clone(), owner, cancel);
        } else {
            let queue = state.waiting.entry(owner).or_default();
            queue.push_back(id.clone());
            let position = queue.len();
            if !state.rotation.contains(&owner) {
                state.rotation.push_back(owner);
            }
            drop(state);

            tracing::info!(
                task_id = %id,
                user_id = owner.0,
                position,
                "task admitted, waiting for a free slot"
            );
            self.emit_event(Event::Queued {
                id: id.clone(),
                owner,
                position,
            });
            self.spawn_notify(
                owner,
                Notification::Queued {
                    id: id.clone(),
                    position,
                },
            );
        }

        Ok(id)
    }

    /// Release the slot a finished task held and backfill it.
    ///
    /// Called exactly once per task by the execution pipeline after its
    /// terminal transition. Promotion is skipped during shutdown so queued
    /// tasks drain as `Cancelled` instead of starting.
    pub(crate) async fn release(&self, id: &TaskId) {
        let mut state = self.state.lock().await;
        state.cancel_tokens.remove(id);

        if !self.accepting_new.load(Ordering::SeqCst) {
            return;
        }

        let promoted = self.promote_waiting(&mut state);
        drop(state);

        for task in promoted {
            self.emit_event(Event::Started {
                id: task.id.clone(),
                owner: task.owner,
            });
            self.spawn_pipeline(task.id, task.owner, task.cancel);
        }
    }
}
