//! Host capabilities behind the script builtins.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::TaskId;

/// Concrete effects a script can reach: diagnostics, one binary output and
/// wall-clock delay.
///
/// Implementations are injected into the scheduler so the core never talks
/// to hardware directly. Calls carry the id of the task whose script made
/// them.
#[async_trait]
pub trait HostCapabilities: Send + Sync {
    /// Write a script message to the diagnostic sink.
    fn log(&self, task: &TaskId, message: &str);

    /// Drive the binary output.
    fn set_output(&self, task: &TaskId, on: bool);

    /// Suspend the calling execution for `duration`.
    ///
    /// Must only suspend the caller; the future is dropped when the
    /// execution is cancelled.
    async fn delay(&self, _task: &TaskId, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Release anything held on behalf of `task` once its execution has
    /// ended, including by forced cancellation.
    fn release(&self, _task: &TaskId) {}
}
