//! Change events published after task mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskState};

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Updated,
    Started,
    Stopped,
    Deleted,
}

/// "Task changed" notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: TaskEventKind,
    /// State after the change; `None` once the task is gone.
    pub state: Option<TaskState>,
    pub at: DateTime<Utc>,
}

impl TaskEvent {
    /// Create an event stamped with the current time.
    pub fn new(task_id: TaskId, kind: TaskEventKind, state: Option<TaskState>) -> Self {
        Self {
            task_id,
            kind,
            state,
            at: Utc::now(),
        }
    }

    pub fn created(task_id: TaskId) -> Self {
        Self::new(task_id, TaskEventKind::Created, Some(TaskState::Stopped))
    }

    pub fn updated(task_id: TaskId, state: TaskState) -> Self {
        Self::new(task_id, TaskEventKind::Updated, Some(state))
    }

    pub fn started(task_id: TaskId) -> Self {
        Self::new(task_id, TaskEventKind::Started, Some(TaskState::Running))
    }

    pub fn stopped(task_id: TaskId) -> Self {
        Self::new(task_id, TaskEventKind::Stopped, Some(TaskState::Stopped))
    }

    pub fn deleted(task_id: TaskId) -> Self {
        Self::new(task_id, TaskEventKind::Deleted, None)
    }
}
