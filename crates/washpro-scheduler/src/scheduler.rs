//! Scheduler: task CRUD and the entry point to the execution engine.
//!
//! Operations are split across modules:
//! - `scheduler.rs`: construction, CRUD, subscriptions
//! - `scheduler_execution.rs`: run, stop, delete, shutdown
//! - `scheduler_reconcile.rs`: startup reconciliation and corruption recovery

use std::sync::Arc;

use dashmap::DashMap;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use washpro_config::{SandboxConfig, SchedulerConfig};
use washpro_protocols::{
    HostCapabilities, IdGenerator, ScriptUpdate, TaskDetail, TaskError, TaskEvent, TaskId, TaskList,
    TaskRecord, TaskSummary,
};
use washpro_store::{StoreError, TaskStore};

use crate::control::{self, ControlQueue};
use crate::notifier::EventNotifier;
use crate::registry::ExecutionRegistry;

/// Shared scheduler state.
pub(crate) struct SchedulerInner {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) host: Arc<dyn HostCapabilities>,
    pub(crate) registry: ExecutionRegistry,
    pub(crate) notifier: EventNotifier,
    pub(crate) control: ControlQueue,
    pub(crate) sandbox_config: SandboxConfig,
    /// Per-id critical sections for check-and-transition sequences.
    locks: DashMap<TaskId, Arc<AsyncMutex<()>>>,
    ids: IdGenerator,
    pub(crate) shutdown: CancellationToken,
    pub(crate) dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Task lifecycle manager.
///
/// Cheap to clone; clones share the same store, registry and notifier.
/// Control operations for the same id are serialized, operations on
/// different ids run in parallel, and none of them wait for a script.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Reconcile persisted state and start accepting calls.
    ///
    /// Every record left `running` by an unclean shutdown is rewritten to
    /// `stopped` before this returns.
    pub async fn start(
        store: Arc<dyn TaskStore>,
        host: Arc<dyn HostCapabilities>,
        config: &SchedulerConfig,
        sandbox_config: &SandboxConfig,
    ) -> Result<Self, TaskError> {
        let (control, receiver) = ControlQueue::channel(config.control_queue_capacity);
        let inner = Arc::new(SchedulerInner {
            store,
            host,
            registry: ExecutionRegistry::new(),
            notifier: EventNotifier::new(config.event_capacity),
            control,
            sandbox_config: sandbox_config.clone(),
            locks: DashMap::new(),
            ids: IdGenerator::new(),
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
        });
        let scheduler = Self::from_inner(inner);

        let reconciled = scheduler.reconcile().await?;
        if reconciled > 0 {
            info!("Reconciled {} task(s) left running by an unclean shutdown", reconciled);
        }

        let dispatcher = control::spawn_dispatcher(
            receiver,
            Arc::downgrade(&scheduler.inner),
            scheduler.inner.shutdown.clone(),
        );
        *scheduler.inner.dispatcher.lock() = Some(dispatcher);

        debug!("Scheduler started");
        Ok(scheduler)
    }

    /// Start with default scheduler and sandbox settings.
    pub async fn with_defaults(
        store: Arc<dyn TaskStore>,
        host: Arc<dyn HostCapabilities>,
    ) -> Result<Self, TaskError> {
        Self::start(store, host, &SchedulerConfig::default(), &SandboxConfig::default()).await
    }

    pub(crate) fn from_inner(inner: Arc<SchedulerInner>) -> Self {
        Self { inner }
    }

    pub(crate) async fn lock_task(&self, id: &TaskId) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub(crate) fn release_task_lock(&self, id: &TaskId) {
        self.inner
            .locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Create a stopped task without a script.
    pub async fn create_task(&self, name: &str) -> Result<TaskId, TaskError> {
        loop {
            let record = TaskRecord::new(self.inner.ids.next_id(), name);
            match self.inner.store.create(&record).await {
                Ok(()) => {
                    info!("Created task '{}' ({})", record.id, record.name);
                    self.inner.notifier.publish(TaskEvent::created(record.id.clone()));
                    return Ok(record.id);
                }
                Err(StoreError::AlreadyExists(id)) => {
                    debug!("Generated id '{}' already taken, retrying", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// All tasks plus the number of live executions.
    pub async fn list_tasks(&self) -> Result<TaskList, TaskError> {
        let mut tasks = Vec::new();
        for id in self.inner.store.list_ids().await? {
            match self.load_record(&id).await {
                Ok(record) => tasks.push(self.summarize(record).await?),
                // Deleted between listing and reading.
                Err(TaskError::NotFound(_)) => {}
                Err(e) => warn!("Leaving task '{}' out of the listing: {}", id, e),
            }
        }

        Ok(TaskList {
            tasks,
            running_count: self.inner.registry.len(),
        })
    }

    pub async fn get_task(&self, id: impl AsRef<str>) -> Result<TaskSummary, TaskError> {
        let id = TaskId::parse(id)?;
        let record = self.load_record(&id).await?;
        self.summarize(record).await
    }

    pub async fn get_task_with_script(&self, id: impl AsRef<str>) -> Result<TaskDetail, TaskError> {
        let id = TaskId::parse(id)?;
        let record = self.load_record(&id).await?;
        let script = self.inner.store.read_script(&id).await?;

        let mut summary = record.summary();
        summary.has_script = script.is_some();
        Ok(TaskDetail {
            summary,
            script: script.unwrap_or_default(),
        })
    }

    /// Script text of a task, or `""` when there is none.
    pub async fn get_script(&self, id: impl AsRef<str>) -> Result<String, TaskError> {
        let id = TaskId::parse(id)?;
        Ok(self.inner.store.read_script(&id).await?.unwrap_or_default())
    }

    /// Apply a rename and/or script replacement.
    ///
    /// `content: Some("")` removes the script. `has_script` is recomputed
    /// from the blob afterwards. An empty update succeeds without writing.
    pub async fn save_script(
        &self,
        id: impl AsRef<str>,
        update: ScriptUpdate,
    ) -> Result<TaskSummary, TaskError> {
        let id = TaskId::parse(id)?;
        let _guard = self.lock_task(&id).await;

        let record = self.load_record(&id).await?;
        if update.is_empty() {
            return self.summarize(record).await;
        }

        match update.content.as_deref() {
            Some("") => self.inner.store.delete_script(&id).await?,
            Some(content) => self.inner.store.write_script(&id, content).await?,
            None => {}
        }
        let has_script = self.inner.store.script_exists(&id).await?;

        let name = update.name;
        let record = self
            .inner
            .store
            .update(&id, &|r: &mut TaskRecord| {
                if let Some(name) = &name {
                    r.name = name.clone();
                }
                r.has_script = has_script;
            })
            .await?;

        debug!("Saved task '{}' (has_script: {})", id, record.has_script);
        self.inner
            .notifier
            .publish(TaskEvent::updated(id, record.state));
        Ok(record.summary())
    }

    /// Names of the builtins scripts can call.
    pub fn builtins(&self) -> &'static [&'static str] {
        washpro_sandbox::BUILTINS
    }

    /// Receive every change event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.notifier.subscribe()
    }

    /// [`Scheduler::subscribe`] as a stream that skips lagged events.
    pub fn subscribe_stream(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        self.inner.notifier.subscribe_stream()
    }

    /// Number of executions currently live.
    pub fn running_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// No live execution and no script-issued command waiting to be applied.
    pub fn is_idle(&self) -> bool {
        self.inner.control.in_flight() == 0
    }

    /// Summary with `has_script` taken from the blob, not the record.
    async fn summarize(&self, record: TaskRecord) -> Result<TaskSummary, TaskError> {
        let mut summary = record.summary();
        summary.has_script = self.inner.store.script_exists(&record.id).await?;
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
