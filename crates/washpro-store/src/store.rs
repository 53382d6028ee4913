//! Task store trait and in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use washpro_protocols::{TaskId, TaskRecord};

use crate::error::StoreError;

/// Change applied to a record by [`TaskStore::update`].
pub type RecordMutator<'a> = &'a (dyn Fn(&mut TaskRecord) + Send + Sync);

/// Task store trait for persistence.
///
/// Records and script blobs live in separate namespaces keyed by the same
/// id. A blob without a record is orphaned and never implies a task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new record. Fails with `AlreadyExists` instead of
    /// overwriting.
    async fn create(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Load a record.
    async fn read(&self, id: &TaskId) -> Result<TaskRecord, StoreError>;

    /// Replace a record unconditionally.
    async fn write(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Read-modify-write a record as one step and return the new record.
    async fn update(&self, id: &TaskId, mutator: RecordMutator<'_>) -> Result<TaskRecord, StoreError>;

    /// Remove a record. Removing an absent record succeeds.
    async fn delete(&self, id: &TaskId) -> Result<(), StoreError>;

    /// Ids of all stored records.
    async fn list_ids(&self) -> Result<Vec<TaskId>, StoreError>;

    /// All records that decode cleanly.
    async fn list_all(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Load a script blob.
    async fn read_script(&self, id: &TaskId) -> Result<Option<String>, StoreError>;

    /// Replace a script blob.
    async fn write_script(&self, id: &TaskId, content: &str) -> Result<(), StoreError>;

    /// Remove a script blob. Removing an absent blob succeeds.
    async fn delete_script(&self, id: &TaskId) -> Result<(), StoreError>;

    /// Whether a script blob exists.
    async fn script_exists(&self, id: &TaskId) -> Result<bool, StoreError>;
}

/// In-memory task store for testing.
pub struct MemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
    scripts: RwLock<HashMap<TaskId, String>>,
}

impl MemoryTaskStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            scripts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn read(&self, id: &TaskId) -> Result<TaskRecord, StoreError> {
        let records = self.records.read().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn write(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, id: &TaskId, mutator: RecordMutator<'_>) -> Result<TaskRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        mutator(record);
        record.touch();
        Ok(record.clone())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let records = self.records.read().await;
        Ok(records.keys().cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn read_script(&self, id: &TaskId) -> Result<Option<String>, StoreError> {
        let scripts = self.scripts.read().await;
        Ok(scripts.get(id).cloned())
    }

    async fn write_script(&self, id: &TaskId, content: &str) -> Result<(), StoreError> {
        let mut scripts = self.scripts.write().await;
        scripts.insert(id.clone(), content.to_string());
        Ok(())
    }

    async fn delete_script(&self, id: &TaskId) -> Result<(), StoreError> {
        let mut scripts = self.scripts.write().await;
        scripts.remove(id);
        Ok(())
    }

    async fn script_exists(&self, id: &TaskId) -> Result<bool, StoreError> {
        let scripts = self.scripts.read().await;
        Ok(scripts.contains_key(id))
    }
}
