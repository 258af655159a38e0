//! Round-robin promotion of waiting tasks into free slots.

use super::{MediaScheduler, SchedulerState};
use crate::types::{TaskId, TaskState, UserId};
use tokio_util::sync::CancellationToken;

/// One task moved from the wait list into `Downloading`.
///
/// Promotion happens under the state lock; the caller emits events and spawns
/// the pipeline for each entry after releasing it.
pub(crate) struct PromotedTask {
    pub(crate) id: TaskId,
    pub(crate) owner: UserId,
    pub(crate) cancel: CancellationToken,
}

impl MediaScheduler {
    /// Fill free slots from the wait lists, fairly across users.
    ///
    /// Users take turns in rotation order: each turn promotes at most one
    /// task (the oldest in that user's FIFO), then the user moves to the back
    /// of the rotation. A user at their per-user cap keeps their place but is
    /// skipped. Cycles repeat until a full pass promotes nothing or the
    /// global cap is reached, so a single release can backfill several slots
    /// when caps allow.
    pub(crate) fn promote_waiting(&self, state: &mut SchedulerState) -> Vec<PromotedTask> {
        let mut promoted = Vec::new();

        loop {
            let mut promoted_this_cycle = false;
            let cycle_len = state.rotation.len();

            for _ in 0..cycle_len {
                if state.registry.active_total() >= self.config.limits.max_active_global {
                    return promoted;
                }
                let Some(user) = state.rotation.pop_front() else {
                    return promoted;
                };

                let Some(queue) = state.waiting.get_mut(&user) else {
                    // Stale rotation entry, drop the user.
                    continue;
                };
                if queue.is_empty() {
                    state.waiting.remove(&user);
                    continue;
                }

                if state.registry.active_count_for(user) >= self.config.limits.max_active_per_user {
                    // At cap: keep the user's place for a later pass.
                    state.rotation.push_back(user);
                    continue;
                }

                let Some(id) = queue.pop_front() else {
                    state.waiting.remove(&user);
                    continue;
                };
                let still_waiting = !queue.is_empty();
                if still_waiting {
                    state.rotation.push_back(user);
                } else {
                    state.waiting.remove(&user);
                }

                match state.registry.transition(&id, TaskState::Downloading) {
                    Ok(_) => {
                        let cancel = CancellationToken::new();
                        state.cancel_tokens.insert(id.clone(), cancel.clone());
                        tracing::info!(task_id = %id, user_id = user.0, "promoted waiting task");
                        promoted.push(PromotedTask {
                            id,
                            owner: user,
                            cancel,
                        });
                        promoted_this_cycle = true;
                    }
                    Err(e) => {
                        // Cancel removes ids from the wait list under the same
                        // lock, so a non-promotable entry indicates a bookkeeping
                        // defect. Force it out of the queue rather than wedge
                        // the rotation.
                        tracing::error!(task_id = %id, error = %e, "waiting task not promotable, dropping");
                        if let Ok(task) = state.registry.transition(&id, TaskState::Failed) {
                            task.failure_reason = Some("internal scheduling error".to_string());
                        }
                    }
                }
            }

            if !promoted_this_cycle {
                return promoted;
            }
        }
    }
}
