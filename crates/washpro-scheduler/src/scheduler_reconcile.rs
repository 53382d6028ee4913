//! Startup reconciliation and recovery of corrupted records.

use tracing::{debug, warn};
use washpro_protocols::{TaskError, TaskId, TaskRecord, TaskState};
use washpro_store::StoreError;

use crate::scheduler::Scheduler;

impl Scheduler {
    /// Bring persisted records in line with an empty registry.
    ///
    /// Records marked running are rewritten to stopped, corrupted records
    /// are replaced with a minimal record, and `has_script` is re-derived
    /// from the blob. Returns the number of records that were running.
    pub(crate) async fn reconcile(&self) -> Result<usize, TaskError> {
        let store = &self.inner.store;
        let mut reconciled = 0;

        for id in store.list_ids().await? {
            let record = match self.load_record(&id).await {
                Ok(record) => record,
                Err(TaskError::NotFound(_)) => continue,
                Err(e) => {
                    warn!("Cannot reconcile task '{}': {}", id, e);
                    continue;
                }
            };

            let was_running = record.is_running();
            let has_script = match store.script_exists(&id).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!("Cannot check script of task '{}': {}", id, e);
                    record.has_script
                }
            };
            if !was_running && has_script == record.has_script {
                continue;
            }

            if was_running {
                warn!("Task '{}' was left running; marking it stopped", id);
                reconciled += 1;
            }
            if has_script != record.has_script {
                debug!("Task '{}' has_script corrected to {}", id, has_script);
            }
            if let Err(e) = store
                .update(&id, &|r: &mut TaskRecord| {
                    r.state = TaskState::Stopped;
                    r.has_script = has_script;
                })
                .await
            {
                warn!("Failed to reconcile task '{}': {}", id, e);
            }
        }

        Ok(reconciled)
    }

    /// Read a record, replacing it with a minimal valid record if it no
    /// longer decodes.
    ///
    /// The replacement keeps the id, takes `has_script` from the blob and is
    /// written back so the loss is only reported once.
    pub(crate) async fn load_record(&self, id: &TaskId) -> Result<TaskRecord, TaskError> {
        let store = &self.inner.store;
        match store.read(id).await {
            Ok(record) => Ok(record),
            Err(StoreError::Corrupted { reason, .. }) => {
                warn!(
                    "Task record '{}' is corrupted ({}); resetting it to a minimal record, name and state are lost",
                    id, reason
                );
                let record = TaskRecord::recovered(id.clone(), store.script_exists(id).await?);
                store.write(&record).await?;
                Ok(record)
            }
            Err(e) => Err(e.into()),
        }
    }
}
