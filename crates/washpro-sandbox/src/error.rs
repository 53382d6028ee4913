//! Sandbox errors.

use thiserror::Error;
use washpro_protocols::TaskError;

/// Sandbox error types.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The interpreter could not be prepared.
    #[error("Sandbox initialization failed: {0}")]
    Init(String),

    /// The script failed to parse or raised a runtime error.
    #[error("Script failed: {0}")]
    Script(String),

    /// The execution was cancelled while the script was running.
    #[error("Script execution cancelled")]
    Cancelled,
}

impl From<SandboxError> for TaskError {
    fn from(err: SandboxError) -> Self {
        TaskError::Sandbox(err.to_string())
    }
}
