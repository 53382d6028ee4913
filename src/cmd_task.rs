//! Task subcommand handlers for washpro.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use washpro_config::Config;
use washpro_protocols::{ScriptUpdate, TaskEventKind};
use washpro_scheduler::Scheduler;

use crate::adapters::open_scheduler;
use crate::cli::TaskAction;

/// Handle task subcommands.
pub(crate) async fn handle_task_command(config: &Config, action: TaskAction) -> anyhow::Result<()> {
    let (scheduler, _host) = open_scheduler(config).await?;
    let result = dispatch(&scheduler, action).await;
    scheduler.shutdown().await;
    result
}

async fn dispatch(scheduler: &Scheduler, action: TaskAction) -> anyhow::Result<()> {
    match action {
        TaskAction::Create { name } => task_create(scheduler, &name).await,
        TaskAction::List { format } => task_list(scheduler, &format).await,
        TaskAction::Show { id, format } => task_show(scheduler, &id, &format).await,
        TaskAction::Script { id } => task_script(scheduler, &id).await,
        TaskAction::Save {
            id,
            name,
            file,
            content,
            clear,
        } => {
            let content = match (file, content, clear) {
                (Some(path), _, _) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading script from {:?}", path))?,
                ),
                (None, Some(content), _) => Some(content),
                (None, None, true) => Some(String::new()),
                (None, None, false) => None,
            };
            task_save(scheduler, &id, ScriptUpdate { name, content }).await
        }
        TaskAction::Run { id, timeout } => task_run(scheduler, &id, timeout.map(Duration::from_secs)).await,
        TaskAction::Stop { id } => {
            scheduler.stop_task(&id).await?;
            println!("Stopped {}", id);
            Ok(())
        }
        TaskAction::Delete { id } => {
            scheduler.delete_task(&id).await?;
            println!("Deleted {}", id);
            Ok(())
        }
        TaskAction::Builtins => {
            for name in scheduler.builtins() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn task_create(scheduler: &Scheduler, name: &str) -> anyhow::Result<()> {
    let id = scheduler.create_task(name).await?;
    println!("{}", id);
    Ok(())
}

async fn task_list(scheduler: &Scheduler, format: &str) -> anyhow::Result<()> {
    let list = scheduler.list_tasks().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&list)?),
        _ => {
            if list.tasks.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }
            println!("{:<20} {:<30} {:<10} {}", "ID", "NAME", "STATE", "SCRIPT");
            println!("{}", "-".repeat(70));
            for task in &list.tasks {
                println!(
                    "{:<20} {:<30} {:<10} {}",
                    task.id,
                    task.name,
                    task.state,
                    if task.has_script { "yes" } else { "no" }
                );
            }
        }
    }
    Ok(())
}

async fn task_show(scheduler: &Scheduler, id: &str, format: &str) -> anyhow::Result<()> {
    let detail = scheduler.get_task_with_script(id).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&detail)?),
        _ => {
            println!("ID:     {}", detail.summary.id);
            println!("Name:   {}", detail.summary.name);
            println!("State:  {}", detail.summary.state);
            println!("Script: {}", if detail.summary.has_script { "yes" } else { "no" });
            if !detail.script.is_empty() {
                println!();
                println!("{}", detail.script);
            }
        }
    }
    Ok(())
}

async fn task_script(scheduler: &Scheduler, id: &str) -> anyhow::Result<()> {
    print!("{}", scheduler.get_script(id).await?);
    Ok(())
}

async fn task_save(scheduler: &Scheduler, id: &str, update: ScriptUpdate) -> anyhow::Result<()> {
    let summary = scheduler.save_script(id, update).await?;
    println!(
        "Saved {} ({}, script: {})",
        summary.id,
        summary.name,
        if summary.has_script { "yes" } else { "no" }
    );
    Ok(())
}

/// Run a task and keep the process alive until the scheduler is idle.
///
/// Tasks started by the script through `startTask` are waited for too,
/// including requests still queued when the script ends.
async fn task_run(scheduler: &Scheduler, id: &str, timeout: Option<Duration>) -> anyhow::Result<()> {
    let mut events = scheduler.subscribe();
    scheduler.run_task(id).await?;
    info!("Task '{}' running; Ctrl-C stops it", id);

    let deadline = async {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut check = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping");
                break;
            }
            _ = &mut deadline => {
                info!("Timeout reached, stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(event) if event.kind == TaskEventKind::Stopped => {
                    if scheduler.is_idle() {
                        break;
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = check.tick() => {
                if scheduler.is_idle() {
                    break;
                }
            }
        }
    }

    // `handle_task_command` shuts the scheduler down, which stops anything
    // still live.
    println!("Task {} finished", id);
    Ok(())
}
