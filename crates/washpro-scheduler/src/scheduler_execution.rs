//! Run, stop and delete: the execution half of the scheduler.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use washpro_protocols::{TaskControl, TaskError, TaskEvent, TaskId, TaskRecord, TaskState};
use washpro_sandbox::{CancelFlag, SandboxError, ScriptSandbox};
use washpro_store::StoreError;

use crate::registry::ExecutionHandle;
use crate::scheduler::{Scheduler, SchedulerInner};

impl Scheduler {
    /// Launch the task's script and return once the task is durably
    /// `running`.
    ///
    /// Fails with `Conflict` if the record says running or a live execution
    /// is registered for the id.
    pub async fn run_task(&self, id: impl AsRef<str>) -> Result<(), TaskError> {
        let id = TaskId::parse(id)?;
        let _guard = self.lock_task(&id).await;

        let record = self.load_record(&id).await?;
        if record.is_running() || self.inner.registry.contains(&id) {
            return Err(TaskError::Conflict(id));
        }

        self.inner
            .store
            .update(&id, &|r: &mut TaskRecord| r.state = TaskState::Running)
            .await?;

        let run_id = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let join = tokio::spawn(execute(
            self.inner.clone(),
            id.clone(),
            run_id,
            cancel.clone(),
        ));
        self.inner.control.begin_work();
        self.inner
            .registry
            .insert(ExecutionHandle::new(id.clone(), run_id, cancel, join));

        info!("Task '{}' started (run {})", id, run_id);
        self.inner.notifier.publish(TaskEvent::started(id));
        Ok(())
    }

    /// Hard-cancel any live execution and mark the task stopped.
    ///
    /// Stopping a task that is not running succeeds without side effects.
    pub async fn stop_task(&self, id: impl AsRef<str>) -> Result<(), TaskError> {
        let id = TaskId::parse(id)?;
        let _guard = self.lock_task(&id).await;

        let cancelled = self.cancel_execution(&id).await;

        let record = match self.load_record(&id).await {
            Ok(record) => record,
            Err(e) => {
                if cancelled {
                    warn!("Cancelled execution of task '{}' but could not load it: {}", id, e);
                }
                return Err(e);
            }
        };
        if !record.is_running() && !cancelled {
            debug!("Task '{}' already stopped", id);
            return Ok(());
        }

        self.inner
            .store
            .update(&id, &|r: &mut TaskRecord| r.state = TaskState::Stopped)
            .await?;

        info!("Task '{}' stopped", id);
        self.inner.notifier.publish(TaskEvent::stopped(id));
        Ok(())
    }

    /// Cancel any live execution, then remove the record and the script.
    ///
    /// Deleting an absent task succeeds.
    pub async fn delete_task(&self, id: impl AsRef<str>) -> Result<(), TaskError> {
        let id = TaskId::parse(id)?;
        let guard = self.lock_task(&id).await;

        let result = async {
            self.cancel_execution(&id).await;
            self.inner.store.delete(&id).await?;
            self.inner.store.delete_script(&id).await?;
            Ok::<(), StoreError>(())
        }
        .await;

        drop(guard);
        self.release_task_lock(&id);
        result?;

        info!("Task '{}' deleted", id);
        self.inner.notifier.publish(TaskEvent::deleted(id));
        Ok(())
    }

    /// Cancel every live execution, mark those tasks stopped and stop
    /// applying script-issued commands.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let dispatcher = self.inner.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            let _ = dispatcher.await;
        }

        let live = self.inner.registry.task_ids();
        for id in &live {
            if let Err(e) = self.stop_task(id).await {
                warn!("Failed to stop task '{}' during shutdown: {}", id, e);
            }
        }
        info!("Scheduler shut down ({} execution(s) cancelled)", live.len());
    }

    /// Remove and terminate the live execution of `id`, releasing its host
    /// resources. Caller holds the task lock.
    async fn cancel_execution(&self, id: &TaskId) -> bool {
        let Some(handle) = self.inner.registry.remove(id) else {
            return false;
        };

        let run_id = handle.run_id;
        let killed = handle.terminate().await;
        self.inner.host.release(id);
        self.inner.control.end_work();

        if killed {
            info!("Cancelled run {} of task '{}'", run_id, id);
        }
        true
    }

    /// Completion path of an execution unit.
    ///
    /// Does nothing if the run was already cancelled or replaced, since the
    /// canceller has performed the cleanup.
    async fn finish_run(&self, id: &TaskId, run_id: Uuid) {
        let _guard = self.lock_task(id).await;

        if self.inner.registry.remove_run(id, run_id).is_none() {
            debug!("Run {} of task '{}' finished after being cancelled", run_id, id);
            return;
        }
        self.inner.host.release(id);

        let marked = match self
            .inner
            .store
            .update(id, &|r: &mut TaskRecord| r.state = TaskState::Stopped)
            .await
        {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => {
                debug!("Task '{}' vanished while running", id);
                false
            }
            Err(e) => {
                warn!("Failed to mark task '{}' stopped: {}", id, e);
                false
            }
        };
        // Settled before the event so listeners observe an idle scheduler.
        self.inner.control.end_work();
        if !marked {
            return;
        }

        debug!("Task '{}' finished (run {})", id, run_id);
        self.inner.notifier.publish(TaskEvent::stopped(id.clone()));
    }
}

/// Body of an execution unit: load the script, run it in a fresh sandbox,
/// then return the task to stopped.
async fn execute(inner: Arc<SchedulerInner>, id: TaskId, run_id: Uuid, cancel: CancelFlag) {
    let source = match inner.store.read_script(&id).await {
        Ok(source) => source.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to load script of task '{}': {}", id, e);
            String::new()
        }
    };

    if source.trim().is_empty() {
        debug!("Task '{}' has no script to run", id);
    } else {
        let control: Arc<dyn TaskControl> = Arc::new(inner.control.clone());
        match ScriptSandbox::new(
            id.clone(),
            inner.host.clone(),
            control,
            &inner.sandbox_config,
            cancel,
        ) {
            Ok(sandbox) => match sandbox.run(&source).await {
                Ok(()) => {}
                Err(SandboxError::Cancelled) => debug!("Script of task '{}' cancelled", id),
                Err(e) => warn!("Script of task '{}' failed: {}", id, e),
            },
            Err(e) => warn!("Could not prepare sandbox for task '{}': {}", id, e),
        }
    }

    Scheduler::from_inner(inner).finish_run(&id, run_id).await;
}
