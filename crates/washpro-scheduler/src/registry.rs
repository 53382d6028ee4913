//! Active-execution registry.
//!
//! In-memory map from task id to the handle of its live execution. Nothing
//! here is persisted; the registry starts empty on every boot.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;
use washpro_protocols::TaskId;
use washpro_sandbox::CancelFlag;

/// Owned, cancellable handle to one execution unit.
///
/// Dropping the handle detaches the unit; [`ExecutionHandle::terminate`]
/// kills it and waits until its interpreter has been dropped.
pub struct ExecutionHandle {
    /// Distinguishes this run from earlier and later runs of the same task.
    pub run_id: Uuid,
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    cancel: CancelFlag,
    join: JoinHandle<()>,
}

impl ExecutionHandle {
    pub fn new(task_id: TaskId, run_id: Uuid, cancel: CancelFlag, join: JoinHandle<()>) -> Self {
        Self {
            run_id,
            task_id,
            started_at: Utc::now(),
            cancel,
            join,
        }
    }

    /// Whether the execution unit has already returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Hard-cancel the execution and wait for it to be torn down.
    ///
    /// The cancel flag interrupts a script busy in the VM and the abort
    /// interrupts one suspended in `delay`. Returns `true` if the unit was
    /// killed, `false` if it had already completed.
    pub async fn terminate(self) -> bool {
        self.cancel.cancel();
        self.join.abort();
        match self.join.await {
            Ok(()) => false,
            Err(e) if e.is_cancelled() => {
                debug!("Execution {} of task '{}' aborted", self.run_id, self.task_id);
                true
            }
            Err(e) => {
                debug!("Execution {} of task '{}' ended abnormally: {}", self.run_id, self.task_id, e);
                true
            }
        }
    }
}

/// Registry of live executions, one per task id at most.
#[derive(Default)]
pub struct ExecutionRegistry {
    executions: DashMap<TaskId, ExecutionHandle>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. Returns the handle it displaced, if any.
    pub fn insert(&self, handle: ExecutionHandle) -> Option<ExecutionHandle> {
        self.executions.insert(handle.task_id.clone(), handle)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.executions.contains_key(id)
    }

    /// Remove whatever handle is registered for `id`.
    pub fn remove(&self, id: &TaskId) -> Option<ExecutionHandle> {
        self.executions.remove(id).map(|(_, handle)| handle)
    }

    /// Remove the handle for `id` only if it belongs to run `run_id`.
    pub fn remove_run(&self, id: &TaskId, run_id: Uuid) -> Option<ExecutionHandle> {
        self.executions
            .remove_if(id, |_, handle| handle.run_id == run_id)
            .map(|(_, handle)| handle)
    }

    /// Ids with a live execution.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.executions.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of live executions.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}
