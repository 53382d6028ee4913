//! Host adapters and shared setup for the washpro binary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;
use washpro_config::Config;
use washpro_protocols::{HostCapabilities, TaskId};
use washpro_scheduler::Scheduler;
use washpro_store::FileTaskStore;

/// Host capabilities backed by the console.
///
/// Script messages become `tracing` events under `washpro::script`. The
/// binary output is simulated; the task that last switched it on owns it and
/// the output is switched off when that task's execution ends.
#[derive(Default)]
pub(crate) struct ConsoleHost {
    output: AtomicBool,
    owner: Mutex<Option<TaskId>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> bool {
        self.output.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostCapabilities for ConsoleHost {
    fn log(&self, task: &TaskId, message: &str) {
        info!(target: "washpro::script", task_id = %task, "{}", message);
    }

    fn set_output(&self, task: &TaskId, on: bool) {
        let mut owner = self.owner.lock();
        self.output.store(on, Ordering::SeqCst);
        *owner = on.then(|| task.clone());
        info!(target: "washpro::output", task_id = %task, "Output {}", if on { "ON" } else { "OFF" });
    }

    fn release(&self, task: &TaskId) {
        let mut owner = self.owner.lock();
        if owner.as_ref() == Some(task) {
            self.output.store(false, Ordering::SeqCst);
            *owner = None;
            info!(target: "washpro::output", task_id = %task, "Output OFF (released)");
        }
    }
}

/// Open the file store and start a scheduler over it.
pub(crate) async fn open_scheduler(config: &Config) -> anyhow::Result<(Scheduler, Arc<ConsoleHost>)> {
    let store = FileTaskStore::new(&config.storage.data_dir).await?;
    let host = Arc::new(ConsoleHost::new());
    let scheduler = Scheduler::start(
        Arc::new(store),
        host.clone(),
        &config.scheduler,
        &config.sandbox,
    )
    .await?;
    Ok((scheduler, host))
}
