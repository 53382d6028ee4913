//! Task operation errors.

use thiserror::Error;

use crate::types::TaskId;

/// Errors returned synchronously by task operations.
///
/// `Sandbox` faults are contained inside the execution unit; the variant
/// exists so they can be reported and logged with the same taxonomy.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Unknown task id.
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// Run requested while an execution is already in flight.
    #[error("Task already running: {0}")]
    Conflict(TaskId),

    /// Malformed or missing input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Record or blob read/write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Script parse or runtime fault.
    #[error("Script error: {0}")]
    Sandbox(String),
}

impl TaskError {
    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            TaskError::NotFound(_) => "not_found",
            TaskError::Conflict(_) => "conflict",
            TaskError::Validation(_) => "validation",
            TaskError::Storage(_) => "storage",
            TaskError::Sandbox(_) => "sandbox",
        }
    }
}
