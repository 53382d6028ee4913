use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use washpro_protocols::{TaskEventKind, TaskState};
use washpro_store::{FileTaskStore, MemoryTaskStore};

use super::*;

#[derive(Default)]
struct RecordingHost {
    logs: Mutex<Vec<(String, String)>>,
    outputs: Mutex<Vec<bool>>,
    releases: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn logs_of(&self, id: &TaskId) -> Vec<String> {
        self.logs
            .lock()
            .iter()
            .filter(|(task, _)| task == id.as_str())
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

#[async_trait]
impl HostCapabilities for RecordingHost {
    fn log(&self, task: &TaskId, message: &str) {
        self.logs.lock().push((task.to_string(), message.to_string()));
    }

    fn set_output(&self, _task: &TaskId, on: bool) {
        self.outputs.lock().push(on);
    }

    fn release(&self, task: &TaskId) {
        self.releases.lock().push(task.to_string());
    }
}

async fn scheduler() -> (Scheduler, Arc<RecordingHost>) {
    let host = Arc::new(RecordingHost::default());
    let scheduler = Scheduler::with_defaults(Arc::new(MemoryTaskStore::new()), host.clone())
        .await
        .unwrap();
    (scheduler, host)
}

async fn task_with_script(scheduler: &Scheduler, script: &str) -> TaskId {
    let id = scheduler.create_task("test").await.unwrap();
    scheduler
        .save_script(&id, ScriptUpdate::new().with_content(script))
        .await
        .unwrap();
    id
}

async fn wait_until_stopped(scheduler: &Scheduler, id: &TaskId) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let task = scheduler.get_task(id).await.unwrap();
            if task.state == TaskState::Stopped && !scheduler.inner.registry.contains(id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not stop in time");
}

#[tokio::test]
async fn test_create_and_get() {
    let (scheduler, _) = scheduler().await;
    let id = scheduler.create_task("Pump Cycle").await.unwrap();

    let task = scheduler.get_task(&id).await.unwrap();
    assert_eq!(task.id, id);
    assert_eq!(task.name, "Pump Cycle");
    assert_eq!(task.state, TaskState::Stopped);
    assert!(!task.has_script);
}

#[tokio::test]
async fn test_get_rejects_malformed_id() {
    let (scheduler, _) = scheduler().await;
    assert!(matches!(scheduler.get_task("").await, Err(TaskError::Validation(_))));
    assert!(matches!(scheduler.run_task("../etc").await, Err(TaskError::Validation(_))));
}

#[tokio::test]
async fn test_get_unknown_task() {
    let (scheduler, _) = scheduler().await;
    assert!(matches!(scheduler.get_task("nope").await, Err(TaskError::NotFound(_))));
    assert!(matches!(
        scheduler.get_task_with_script("nope").await,
        Err(TaskError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_save_script_sets_has_script() {
    let (scheduler, _) = scheduler().await;
    let id = scheduler.create_task("Rinse").await.unwrap();

    let summary = scheduler
        .save_script(&id, ScriptUpdate::from_form("", "log('hi')"))
        .await
        .unwrap();
    assert!(summary.has_script);
    assert_eq!(summary.name, "Rinse");

    let detail = scheduler.get_task_with_script(&id).await.unwrap();
    assert_eq!(detail.script, "log('hi')");
    assert!(detail.summary.has_script);
    assert_eq!(scheduler.get_script(&id).await.unwrap(), "log('hi')");
}

#[tokio::test]
async fn test_save_script_rename_keeps_script() {
    let (scheduler, _) = scheduler().await;
    let id = task_with_script(&scheduler, "log('hi')").await;

    scheduler
        .save_script(&id, ScriptUpdate::from_form("NewName", ""))
        .await
        .unwrap();

    let task = scheduler.get_task(&id).await.unwrap();
    assert_eq!(task.name, "NewName");
    assert!(task.has_script);
}

#[tokio::test]
async fn test_save_script_empty_content_clears_blob() {
    let (scheduler, _) = scheduler().await;
    let id = task_with_script(&scheduler, "log('hi')").await;

    let summary = scheduler
        .save_script(&id, ScriptUpdate::new().with_content(""))
        .await
        .unwrap();

    assert!(!summary.has_script);
    assert_eq!(scheduler.get_script(&id).await.unwrap(), "");
}

#[tokio::test]
async fn test_save_script_empty_update_is_noop() {
    let (scheduler, _) = scheduler().await;
    let id = scheduler.create_task("Keep").await.unwrap();
    let mut events = scheduler.subscribe();

    let summary = scheduler.save_script(&id, ScriptUpdate::new()).await.unwrap();

    assert_eq!(summary.name, "Keep");
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_save_script_empty_update_reports_blob_presence() {
    let (scheduler, _) = scheduler().await;
    let id = scheduler.create_task("Drift").await.unwrap();
    // Blob written behind the record's back; the persisted flag is stale.
    scheduler.inner.store.write_script(&id, "log('x')").await.unwrap();

    let summary = scheduler.save_script(&id, ScriptUpdate::new()).await.unwrap();

    assert!(summary.has_script);
    assert_eq!(summary, scheduler.get_task(&id).await.unwrap());
}

#[tokio::test]
async fn test_save_script_unknown_task() {
    let (scheduler, _) = scheduler().await;
    let result = scheduler
        .save_script("ghost", ScriptUpdate::new().with_name("x"))
        .await;
    assert!(matches!(result, Err(TaskError::NotFound(_))));

    let result = scheduler.save_script("ghost", ScriptUpdate::new()).await;
    assert!(matches!(result, Err(TaskError::NotFound(_))));
}

#[tokio::test]
async fn test_get_script_without_blob() {
    let (scheduler, _) = scheduler().await;
    let id = scheduler.create_task("Empty").await.unwrap();

    assert_eq!(scheduler.get_script(&id).await.unwrap(), "");
    assert_eq!(scheduler.get_script("unknown").await.unwrap(), "");
}

#[tokio::test]
async fn test_run_completes_and_stops() {
    let (scheduler, host) = scheduler().await;
    let id = task_with_script(&scheduler, "log('on') setOutput(true) setOutput(false)").await;

    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;

    assert_eq!(host.logs_of(&id), vec!["on"]);
    assert_eq!(*host.outputs.lock(), vec![true, false]);
    assert_eq!(*host.releases.lock(), vec![id.to_string()]);
}

#[tokio::test]
async fn test_run_without_script_stops() {
    let (scheduler, _) = scheduler().await;
    let id = scheduler.create_task("Nothing").await.unwrap();

    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;
}

#[tokio::test]
async fn test_run_unknown_task() {
    let (scheduler, _) = scheduler().await;
    assert!(matches!(scheduler.run_task("missing").await, Err(TaskError::NotFound(_))));
}

#[tokio::test]
async fn test_second_run_conflicts() {
    let (scheduler, _) = scheduler().await;
    let id = task_with_script(&scheduler, "delay(60000)").await;

    scheduler.run_task(&id).await.unwrap();
    assert!(matches!(scheduler.run_task(&id).await, Err(TaskError::Conflict(_))));
    assert_eq!(scheduler.list_tasks().await.unwrap().running_count, 1);

    scheduler.stop_task(&id).await.unwrap();
}

#[tokio::test]
async fn test_script_fault_returns_task_to_stopped() {
    let (scheduler, host) = scheduler().await;
    let id = task_with_script(&scheduler, "log('a') error('boom') log('b')").await;

    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;

    assert_eq!(host.logs_of(&id), vec!["a"]);
    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;
}

#[tokio::test]
async fn test_syntax_error_returns_task_to_stopped() {
    let (scheduler, _) = scheduler().await;
    let id = task_with_script(&scheduler, "this is not lua").await;

    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;
}

#[tokio::test]
async fn test_stop_interrupts_delay() {
    let (scheduler, host) = scheduler().await;
    let id = task_with_script(&scheduler, "log('before') delay(60000) log('after')").await;

    scheduler.run_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    scheduler.stop_task(&id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let task = scheduler.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Stopped);
    assert_eq!(scheduler.running_count(), 0);
    assert_eq!(*host.releases.lock(), vec![id.to_string()]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(host.logs_of(&id), vec!["before"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_interrupts_busy_loop() {
    let (scheduler, _) = scheduler().await;
    let id = task_with_script(&scheduler, "local n = 0 while true do n = n + 1 end").await;

    scheduler.run_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), scheduler.stop_task(&id))
        .await
        .expect("stop did not complete")
        .unwrap();
    assert_eq!(scheduler.get_task(&id).await.unwrap().state, TaskState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_interrupts_loop_that_swallows_errors() {
    let (scheduler, host) = scheduler().await;
    let id = task_with_script(
        &scheduler,
        "while true do pcall(function() while true do end end) end",
    )
    .await;

    scheduler.run_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), scheduler.stop_task(&id))
        .await
        .expect("stop did not complete")
        .unwrap();
    assert_eq!(scheduler.get_task(&id).await.unwrap().state, TaskState::Stopped);
    assert_eq!(*host.releases.lock(), vec![id.to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_interrupts_busy_loop() {
    let (scheduler, _) = scheduler().await;
    let id = task_with_script(&scheduler, "while true do end").await;

    scheduler.run_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), scheduler.delete_task(&id))
        .await
        .expect("delete did not complete")
        .unwrap();
    assert_eq!(scheduler.running_count(), 0);
    assert!(matches!(scheduler.get_task(&id).await, Err(TaskError::NotFound(_))));
}

#[tokio::test]
async fn test_stop_already_stopped_is_idempotent() {
    let (scheduler, host) = scheduler().await;
    let id = scheduler.create_task("Idle").await.unwrap();
    let mut events = scheduler.subscribe();

    scheduler.stop_task(&id).await.unwrap();
    scheduler.stop_task(&id).await.unwrap();

    assert!(host.releases.lock().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_stop_unknown_task() {
    let (scheduler, _) = scheduler().await;
    assert!(matches!(scheduler.stop_task("ghost").await, Err(TaskError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_running_task() {
    let (scheduler, host) = scheduler().await;
    let id = task_with_script(&scheduler, "delay(60000)").await;
    scheduler.run_task(&id).await.unwrap();

    scheduler.delete_task(&id).await.unwrap();

    assert!(matches!(scheduler.get_task(&id).await, Err(TaskError::NotFound(_))));
    assert_eq!(scheduler.get_script(&id).await.unwrap(), "");
    assert!(scheduler.list_tasks().await.unwrap().tasks.is_empty());
    assert_eq!(scheduler.running_count(), 0);
    assert_eq!(*host.releases.lock(), vec![id.to_string()]);
}

#[tokio::test]
async fn test_delete_absent_task_succeeds() {
    let (scheduler, _) = scheduler().await;
    scheduler.delete_task("never-existed").await.unwrap();

    let id = scheduler.create_task("x").await.unwrap();
    scheduler.delete_task(&id).await.unwrap();
    scheduler.delete_task(&id).await.unwrap();
}

#[tokio::test]
async fn test_list_tasks() {
    let (scheduler, _) = scheduler().await;
    let a = scheduler.create_task("A").await.unwrap();
    let b = task_with_script(&scheduler, "delay(60000)").await;
    scheduler.run_task(&b).await.unwrap();

    let list = scheduler.list_tasks().await.unwrap();
    assert_eq!(list.tasks.len(), 2);
    assert_eq!(list.running_count, 1);
    let running: Vec<_> = list
        .tasks
        .iter()
        .filter(|t| t.state == TaskState::Running)
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(running, vec![b.clone()]);
    assert!(list.tasks.iter().any(|t| t.id == a && !t.has_script));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let (scheduler, _) = scheduler().await;
    let mut events = scheduler.subscribe();

    let id = task_with_script(&scheduler, "log('x')").await;
    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;
    scheduler.delete_task(&id).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.task_id, id);
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            TaskEventKind::Created,
            TaskEventKind::Updated,
            TaskEventKind::Started,
            TaskEventKind::Stopped,
            TaskEventKind::Deleted,
        ]
    );
}

#[tokio::test]
async fn test_idle_only_when_nothing_runs() {
    let (scheduler, _) = scheduler().await;
    assert!(scheduler.is_idle());

    let id = task_with_script(&scheduler, "delay(60000)").await;
    scheduler.run_task(&id).await.unwrap();
    assert!(!scheduler.is_idle());

    scheduler.stop_task(&id).await.unwrap();
    assert!(scheduler.is_idle());
}

#[tokio::test]
async fn test_queued_start_keeps_scheduler_busy() {
    let (scheduler, host) = scheduler().await;
    let worker = task_with_script(&scheduler, "delay(100) log('worker ran')").await;
    let starter = task_with_script(&scheduler, &format!("startTask('{}')", worker)).await;
    let mut events = scheduler.subscribe();

    scheduler.run_task(&starter).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.task_id == starter && event.kind == TaskEventKind::Stopped {
                break;
            }
        }
    })
    .await
    .expect("starter never stopped");

    // The start request is either still queued or the worker is running.
    assert!(!scheduler.is_idle());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !scheduler.is_idle() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scheduler never went idle");
    assert_eq!(host.logs_of(&worker), vec!["worker ran"]);
}

#[tokio::test]
async fn test_script_starts_other_task() {
    let (scheduler, host) = scheduler().await;
    let worker = task_with_script(&scheduler, "log('worker ran')").await;
    let starter = task_with_script(&scheduler, &format!("startTask('{}')", worker)).await;

    scheduler.run_task(&starter).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while host.logs_of(&worker).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker never ran");
    wait_until_stopped(&scheduler, &worker).await;
}

#[tokio::test]
async fn test_script_stops_other_task() {
    let (scheduler, _) = scheduler().await;
    let sleeper = task_with_script(&scheduler, "delay(60000)").await;
    let stopper = task_with_script(&scheduler, &format!("stopTask('{}')", sleeper)).await;

    scheduler.run_task(&sleeper).await.unwrap();
    scheduler.run_task(&stopper).await.unwrap();

    wait_until_stopped(&scheduler, &sleeper).await;
    wait_until_stopped(&scheduler, &stopper).await;
}

#[tokio::test]
async fn test_self_start_is_rejected_while_running() {
    let (scheduler, host) = scheduler().await;
    let id = scheduler.create_task("loop").await.unwrap();
    let script = format!("log('run') startTask('{}') delay(100)", id);
    scheduler
        .save_script(&id, ScriptUpdate::new().with_content(script))
        .await
        .unwrap();

    scheduler.run_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(host.logs_of(&id), vec!["run"]);
    scheduler.stop_task(&id).await.unwrap();
}

#[tokio::test]
async fn test_script_stops_itself() {
    let (scheduler, host) = scheduler().await;
    let id = scheduler.create_task("self-stop").await.unwrap();
    let script = format!("stopTask('{}') delay(60000) log('unreachable')", id);
    scheduler
        .save_script(&id, ScriptUpdate::new().with_content(script))
        .await
        .unwrap();

    scheduler.run_task(&id).await.unwrap();
    wait_until_stopped(&scheduler, &id).await;
    assert!(host.logs_of(&id).is_empty());
}

#[tokio::test]
async fn test_startup_reconciles_running_records() {
    let store = Arc::new(MemoryTaskStore::new());
    let mut stale = TaskRecord::new(TaskId::parse("stale").unwrap(), "Left running");
    stale.state = TaskState::Running;
    stale.has_script = true;
    store.create(&stale).await.unwrap();

    let scheduler = Scheduler::with_defaults(store.clone(), Arc::new(RecordingHost::default()))
        .await
        .unwrap();

    let record = store.read(&stale.id).await.unwrap();
    assert_eq!(record.state, TaskState::Stopped);
    assert!(!record.has_script);
    assert_eq!(scheduler.running_count(), 0);
    scheduler.run_task("stale").await.unwrap();
}

#[tokio::test]
async fn test_corrupted_record_is_recovered() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileTaskStore::new(temp_dir.path()).await.unwrap());
    let id = TaskId::parse("broken").unwrap();
    store.create(&TaskRecord::new(id.clone(), "Soak")).await.unwrap();
    store.write_script(&id, "log('x')").await.unwrap();

    let scheduler = Scheduler::with_defaults(store.clone(), Arc::new(RecordingHost::default()))
        .await
        .unwrap();
    std::fs::write(temp_dir.path().join("tasks").join("broken.json"), "{\"id\":").unwrap();

    let task = scheduler.get_task(&id).await.unwrap();
    assert_eq!(task.name, "");
    assert_eq!(task.state, TaskState::Stopped);
    assert!(task.has_script);

    let repaired = store.read(&id).await.unwrap();
    assert_eq!(repaired.id, id);
}

#[tokio::test]
async fn test_shutdown_stops_live_executions() {
    let (scheduler, host) = scheduler().await;
    let a = task_with_script(&scheduler, "delay(60000)").await;
    let b = task_with_script(&scheduler, "delay(60000)").await;
    scheduler.run_task(&a).await.unwrap();
    scheduler.run_task(&b).await.unwrap();

    scheduler.shutdown().await;

    assert_eq!(scheduler.running_count(), 0);
    for id in [&a, &b] {
        assert_eq!(scheduler.get_task(id).await.unwrap().state, TaskState::Stopped);
    }
    assert_eq!(host.releases.lock().len(), 2);
}

#[test]
fn test_builtins_are_exposed() {
    let names = washpro_sandbox::BUILTINS;
    assert!(names.contains(&"startTask"));
    assert!(names.contains(&"delay"));
}
