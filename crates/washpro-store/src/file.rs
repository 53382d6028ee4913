//! File-backed task store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use washpro_protocols::{TaskId, TaskRecord};

use crate::error::StoreError;
use crate::store::{RecordMutator, TaskStore};

const TEMP_SUFFIX: &str = "tmp";

/// File system based task store.
///
/// Every record and script is its own file:
/// ```text
/// {storage_path}/
/// ├── tasks/
/// │   └── {id}.json
/// └── scripts/
///     └── {id}.lua
/// ```
///
/// Writes go to `{file}.tmp` and are renamed over the target, so a reader
/// sees either the previous or the new content, never a partial file.
/// Temporaries left behind by a crash are removed when the store opens.
pub struct FileTaskStore {
    /// Base storage path.
    storage_path: PathBuf,
    /// Per-id locks serializing record and blob mutations.
    locks: DashMap<TaskId, Arc<Mutex<()>>>,
}

impl FileTaskStore {
    /// Open (and create if needed) a store rooted at `storage_path`.
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        let store = Self {
            storage_path,
            locks: DashMap::new(),
        };

        for dir in [store.tasks_dir(), store.scripts_dir()] {
            fs::create_dir_all(&dir).await?;
            store.remove_stale_temporaries(&dir).await?;
        }

        debug!("FileTaskStore initialized at {:?}", store.storage_path);
        Ok(store)
    }

    /// Base storage path.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn tasks_dir(&self) -> PathBuf {
        self.storage_path.join("tasks")
    }

    fn scripts_dir(&self) -> PathBuf {
        self.storage_path.join("scripts")
    }

    fn record_path(&self, id: &TaskId) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", id))
    }

    fn script_path(&self, id: &TaskId) -> PathBuf {
        self.scripts_dir().join(format!("{}.lua", id))
    }

    async fn lock(&self, id: &TaskId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    fn release_lock(&self, id: &TaskId) {
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn remove_stale_temporaries(&self, dir: &Path) -> Result<(), StoreError> {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
                warn!("Removing incomplete write left behind: {:?}", path);
                remove_if_present(&path).await?;
            }
        }
        Ok(())
    }

    /// Write `content` to `path` via a synced temporary and a rename.
    async fn atomic_write(&self, path: &Path, content: &[u8]) -> Result<(), StoreError> {
        let mut temp = path.as_os_str().to_owned();
        temp.push(".");
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn encode(record: &TaskRecord) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize task: {}", e)))
    }

    async fn read_record(&self, id: &TaskId) -> Result<TaskRecord, StoreError> {
        let content = match fs::read(self.record_path(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id.clone())),
            Err(e) => return Err(e.into()),
        };

        let record: TaskRecord =
            serde_json::from_slice(&content).map_err(|e| StoreError::Corrupted {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        if record.id != *id {
            return Err(StoreError::Corrupted {
                id: id.clone(),
                reason: format!("record carries foreign id '{}'", record.id),
            });
        }
        Ok(record)
    }

    async fn write_record(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let content = Self::encode(record)?;
        self.atomic_write(&self.record_path(&record.id), &content).await
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let _guard = self.lock(&record.id).await;

        if fs::try_exists(self.record_path(&record.id)).await? {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        self.write_record(record).await?;

        debug!("Created task record '{}'", record.id);
        Ok(())
    }

    async fn read(&self, id: &TaskId) -> Result<TaskRecord, StoreError> {
        let _guard = self.lock(id).await;
        self.read_record(id).await
    }

    async fn write(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let _guard = self.lock(&record.id).await;
        self.write_record(record).await?;
        debug!("Wrote task record '{}'", record.id);
        Ok(())
    }

    async fn update(&self, id: &TaskId, mutator: RecordMutator<'_>) -> Result<TaskRecord, StoreError> {
        let _guard = self.lock(id).await;

        let mut record = self.read_record(id).await?;
        mutator(&mut record);
        record.touch();
        self.write_record(&record).await?;

        debug!("Updated task record '{}' (state: {})", id, record.state);
        Ok(record)
    }

    async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        let guard = self.lock(id).await;
        let removed = remove_if_present(&self.record_path(id)).await;
        drop(guard);
        self.release_lock(id);

        if removed? {
            debug!("Deleted task record '{}'", id);
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(self.tasks_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match TaskId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Ignoring task file with invalid name {:?}: {}", path, e),
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn list_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut records = Vec::new();
        for id in self.list_ids().await? {
            match self.read(&id).await {
                Ok(record) => records.push(record),
                // Deleted between listing and reading.
                Err(StoreError::NotFound(_)) => {}
                Err(e) => warn!("Skipping unreadable task record '{}': {}", id, e),
            }
        }

        debug!("Loaded {} task records", records.len());
        Ok(records)
    }

    async fn read_script(&self, id: &TaskId) -> Result<Option<String>, StoreError> {
        let _guard = self.lock(id).await;
        match fs::read_to_string(self.script_path(id)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_script(&self, id: &TaskId, content: &str) -> Result<(), StoreError> {
        let _guard = self.lock(id).await;
        self.atomic_write(&self.script_path(id), content.as_bytes()).await?;
        debug!("Wrote {} bytes of script for '{}'", content.len(), id);
        Ok(())
    }

    async fn delete_script(&self, id: &TaskId) -> Result<(), StoreError> {
        let _guard = self.lock(id).await;
        if remove_if_present(&self.script_path(id)).await? {
            debug!("Deleted script for '{}'", id);
        }
        Ok(())
    }

    async fn script_exists(&self, id: &TaskId) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.script_path(id)).await?)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
