//! Task identity, persisted record and the views handed to callers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Opaque, immutable task identifier.
///
/// Ids double as file names in the store, so only ASCII alphanumerics,
/// `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub(crate) String);

impl TaskId {
    /// Parse and validate an id supplied by a caller.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, TaskError> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            return Err(TaskError::Validation("task id must not be empty".to_string()));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(TaskError::Validation(format!(
                "task id '{}' contains invalid character '{}'",
                raw, bad
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Not executing. Initial state and the state between runs.
    #[default]
    Stopped,
    /// An execution unit owns the task.
    Running,
}

impl TaskState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Stopped => "stopped",
            TaskState::Running => "running",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata record persisted per task.
///
/// `has_script` mirrors whether a script blob exists; writers recompute it
/// whenever they touch the blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub has_script: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// A freshly created, stopped task without a script.
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            state: TaskState::Stopped,
            has_script: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Minimal valid record used when a stored record could not be decoded.
    pub fn recovered(id: TaskId, has_script: bool) -> Self {
        let mut record = Self::new(id, "");
        record.has_script = has_script;
        record
    }

    /// Whether the persisted state says an execution is in flight.
    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Caller-facing view of the record.
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            has_script: self.has_script,
        }
    }
}

/// Task view returned by list/get operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub has_script: bool,
}

/// Task view together with its script text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub script: String,
}

/// Result of listing all tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub tasks: Vec<TaskSummary>,
    /// Number of executions currently live.
    pub running_count: usize,
}

/// Optional name and script changes applied by `SaveScript`.
///
/// `content: Some("")` clears the script blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptUpdate {
    pub name: Option<String>,
    pub content: Option<String>,
}

impl ScriptUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an update from form-style fields where an empty string means
    /// "not supplied".
    pub fn from_form(name: &str, content: &str) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            name: non_empty(name),
            content: non_empty(content),
        }
    }

    /// Set the new task name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the new script content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// True when neither field is supplied.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.content.is_none()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
