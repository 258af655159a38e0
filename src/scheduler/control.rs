//! Cancellation, status queries, statistics, and shutdown.

use super::{MediaScheduler, SchedulerState};
use crate::error::{Error, Result};
use crate::external::Notification;
use crate::types::{Event, QueueStats, TaskId, TaskInfo, TaskState, UserId};
use std::sync::atomic::Ordering;

/// Side effects a cancellation decided under the lock, performed after it.
enum CancelAction {
    /// Queued task moved straight to `Cancelled`; announce it.
    Finalized { owner: UserId },
    /// Active task signalled; its pipeline does the terminal bookkeeping.
    Signalled,
}

impl MediaScheduler {
    /// Cancel one task by id.
    ///
    /// A queued task is finalized immediately. An active task is signalled
    /// through its cancellation token and reaches `Cancelled` once its
    /// pipeline observes the signal, within the collaborators' stop bound. A
    /// task already terminal is a no-op; the call reports the state it found.
    ///
    /// Returns the task's state as of this call, or [`Error::NotFound`] for
    /// an id the registry has never seen or has already pruned.
    pub async fn cancel(&self, id: &TaskId) -> Result<TaskState> {
        let mut state = self.state.lock().await;

        let task = state
            .registry
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let found_state = task.state;
        if found_state.is_terminal() {
            return Ok(found_state);
        }

        let action = self.cancel_task_locked(&mut state, id)?;
        drop(state);

        self.apply_cancel_action(id, action);
        Ok(found_state)
    }

    /// Cancel all of `owner`'s non-terminal tasks.
    ///
    /// Returns how many tasks were cancelled or signalled.
    pub async fn cancel_all(&self, owner: UserId) -> Result<usize> {
        let mut state = self.state.lock().await;

        let ids: Vec<TaskId> = state
            .registry
            .list_by_owner(owner)
            .iter()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.id.clone())
            .collect();

        let mut actions = Vec::with_capacity(ids.len());
        for id in &ids {
            actions.push((id.clone(), self.cancel_task_locked(&mut state, id)?));
        }
        drop(state);

        for (id, action) in actions {
            self.apply_cancel_action(&id, action);
        }
        Ok(ids.len())
    }

    /// Shared cancel path for one non-terminal task, under the state lock.
    fn cancel_task_locked(
        &self,
        state: &mut SchedulerState,
        id: &TaskId,
    ) -> Result<CancelAction> {
        let task = state
            .registry
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let owner = task.owner;

        if task.state == TaskState::Queued {
            state.registry.transition(id, TaskState::Cancelled)?;
            state.remove_from_waiting(owner, id);
            tracing::info!(task_id = %id, user_id = owner.0, "cancelled queued task");
            Ok(CancelAction::Finalized { owner })
        } else {
            if let Some(task) = state.registry.get_mut(id) {
                task.cancel_requested = true;
            }
            if let Some(token) = state.cancel_tokens.get(id) {
                token.cancel();
            }
            tracing::info!(task_id = %id, user_id = owner.0, "cancellation signalled to running task");
            Ok(CancelAction::Signalled)
        }
    }

    fn apply_cancel_action(&self, id: &TaskId, action: CancelAction) {
        match action {
            CancelAction::Finalized { owner } => {
                self.emit_event(Event::Cancelled {
                    id: id.clone(),
                    owner,
                });
                self.spawn_notify(owner, Notification::Cancelled { id: id.clone() });
            }
            CancelAction::Signalled => {}
        }
    }

    /// Snapshot all of `owner`'s tracked tasks, oldest first.
    ///
    /// Terminal tasks are included in the returned snapshot and then pruned:
    /// a finished task is reported exactly once through this call, after
    /// which its id resolves to [`Error::NotFound`]. Ids are never reused.
    pub async fn status(&self, owner: UserId) -> Vec<TaskInfo> {
        let mut state = self.state.lock().await;

        let infos: Vec<TaskInfo> = state
            .registry
            .list_by_owner(owner)
            .iter()
            .map(|t| t.info())
            .collect();

        for info in &infos {
            if info.state.is_terminal() {
                state.registry.remove(&info.id);
            }
        }
        infos
    }

    /// Scheduler-wide counters for dashboards and operator commands.
    pub async fn queue_stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            active: state.registry.active_total(),
            queued: state.registry.queued_total(),
            active_users: state.registry.active_users(),
            waiting_users: state.waiting.len(),
            accepting_new: self.accepting_new.load(Ordering::SeqCst),
        }
    }

    /// Begin graceful shutdown.
    ///
    /// New submissions are rejected from this point on. Queued tasks are
    /// finalized as `Cancelled` immediately; active tasks are signalled and
    /// wind down through their pipelines (their slots are not backfilled).
    /// The call returns once everything has been signalled, it does not wait
    /// for active pipelines to finish.
    pub async fn shutdown(&self) {
        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("shutdown initiated, draining queued tasks");

        let mut state = self.state.lock().await;

        let queued: Vec<(TaskId, UserId)> = state
            .waiting
            .values()
            .flatten()
            .filter_map(|id| state.registry.get(id).map(|t| (t.id.clone(), t.owner)))
            .collect();
        state.waiting.clear();
        state.rotation.clear();

        let mut finalized = Vec::with_capacity(queued.len());
        for (id, owner) in queued {
            match state.registry.transition(&id, TaskState::Cancelled) {
                Ok(_) => finalized.push((id, owner)),
                Err(e) => {
                    tracing::error!(task_id = %id, error = %e, "queued task not cancellable during shutdown")
                }
            }
        }

        let running: Vec<TaskId> = state.cancel_tokens.keys().cloned().collect();
        for id in &running {
            if let Some(task) = state.registry.get_mut(id) {
                task.cancel_requested = true;
            }
            if let Some(token) = state.cancel_tokens.get(id) {
                token.cancel();
            }
        }
        drop(state);

        for (id, owner) in finalized {
            self.emit_event(Event::Cancelled {
                id: id.clone(),
                owner,
            });
            self.spawn_notify(owner, Notification::Cancelled { id });
        }
        self.emit_event(Event::Shutdown);
    }
}
