//! Task-to-task control available to scripts.

use crate::types::TaskId;

/// Start/stop requests issued from inside a running script.
///
/// Requests are fire-and-forget: implementations queue them for the
/// scheduler instead of calling back into it on the script's stack, and
/// results are not reported to the script. A script may target its own id
/// or form start cycles with other tasks; the scheduler's conflict rule
/// (one live execution per task) is the only guard against runaway
/// restarts.
pub trait TaskControl: Send + Sync {
    /// Ask the scheduler to run `target`.
    fn start_task(&self, origin: &TaskId, target: &str);

    /// Ask the scheduler to stop `target`.
    fn stop_task(&self, origin: &TaskId, target: &str);
}
