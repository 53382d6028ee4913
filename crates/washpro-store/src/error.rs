//! Store errors.

use thiserror::Error;
use washpro_protocols::{TaskError, TaskId};

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for this id.
    #[error("Task record not found: {0}")]
    NotFound(TaskId),

    /// A record already exists for this id.
    #[error("Task record already exists: {0}")]
    AlreadyExists(TaskId),

    /// The record exists but could not be decoded.
    #[error("Corrupted task record {id}: {reason}")]
    Corrupted { id: TaskId, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => TaskError::NotFound(id),
            other => TaskError::Storage(other.to_string()),
        }
    }
}
