//! Task registry — the authoritative id→task map.
//!
//! Purely synchronous; the scheduler owns the single instance behind its
//! coordination lock, so every `create`/`transition`/`remove` interleaving is
//! serialized there. Terminal tasks stay queryable until the owner observes
//! them via a status call, but issued ids are remembered for the whole process
//! lifetime so an id is never handed out twice.

use crate::error::{Error, Result};
use crate::types::{
    DownloadRequest, Progress, TASK_ID_SUFFIX_LEN, TaskId, TaskInfo, TaskState, UserId,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Alphabet the id suffix is drawn from.
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One user's request and its lifecycle state.
#[derive(Clone, Debug)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) owner: UserId,
    pub(crate) request: DownloadRequest,
    pub(crate) state: TaskState,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) progress: Option<Progress>,
    pub(crate) cancel_requested: bool,
    pub(crate) failure_reason: Option<String>,
}

impl Task {
    /// Public snapshot for status queries.
    pub(crate) fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id.clone(),
            owner: self.owner,
            state: self.state,
            progress: self.progress,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Authoritative mapping from task identifier to [`Task`].
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    tasks: HashMap<TaskId, Task>,
    /// Every id ever handed out, never pruned.
    issued: HashSet<TaskId>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh unique id and store a new task in `Queued`.
    pub(crate) fn create(&mut self, owner: UserId, request: DownloadRequest) -> &Task {
        let id = self.generate_id();
        self.issued.insert(id.clone());

        let task = Task {
            id: id.clone(),
            owner,
            request,
            state: TaskState::Queued,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            progress: None,
            cancel_requested: false,
            failure_reason: None,
        };
        self.tasks.entry(id).or_insert(task)
    }

    /// Draw suffixes until one not present among all ever-issued ids is found.
    ///
    /// Collisions are re-checked against the issued set, not assumed away:
    /// the 36^4 space is small enough that a long-lived process will see them.
    fn generate_id(&self) -> TaskId {
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..TASK_ID_SUFFIX_LEN)
                .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
                .collect();
            let candidate = TaskId::from_suffix(&suffix);
            if !self.issued.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub(crate) fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Remove a task from active tracking. The id stays burned.
    pub(crate) fn remove(&mut self, id: &TaskId) -> Option<Task> {
        self.tasks.remove(id)
    }

    /// All of one owner's tasks, oldest first.
    pub(crate) fn list_by_owner(&self, owner: UserId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().filter(|t| t.owner == owner).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Apply a state change, rejecting anything that violates the
    /// forward-only ordering. Stamps `started_at` on entering `Downloading`
    /// and `ended_at` on entering a terminal state.
    pub(crate) fn transition(&mut self, id: &TaskId, new_state: TaskState) -> Result<&mut Task> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !task.state.can_transition_to(new_state) {
            return Err(Error::InvalidTransition {
                id: id.clone(),
                from: task.state,
                to: new_state,
            });
        }

        task.state = new_state;
        match new_state {
            TaskState::Downloading => task.started_at = Some(Utc::now()),
            s if s.is_terminal() => task.ended_at = Some(Utc::now()),
            _ => {}
        }
        Ok(task)
    }

    /// Count of `owner`'s tasks in `Downloading`/`Uploading`.
    pub(crate) fn active_count_for(&self, owner: UserId) -> usize {
        self.tasks
            .values()
            .filter(|t| t.owner == owner && t.state.is_active())
            .count()
    }

    /// Count of active tasks across all users.
    pub(crate) fn active_total(&self) -> usize {
        self.tasks.values().filter(|t| t.state.is_active()).count()
    }

    /// Distinct users with at least one active task.
    pub(crate) fn active_users(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.state.is_active())
            .map(|t| t.owner)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Count of tasks currently in `Queued`.
    pub(crate) fn queued_total(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.state == TaskState::Queued)
            .count()
    }

    /// `owner`'s non-terminal task with the same source URL, if any.
    ///
    /// Duplicate submissions are user-visible and intentional resubmission is
    /// allowed, so callers only warn on a hit.
    pub(crate) fn find_duplicate(&self, owner: UserId, url: &str) -> Option<&Task> {
        self.tasks
            .values()
            .find(|t| t.owner == owner && !t.state.is_terminal() && t.request.url == url)
    }
}
