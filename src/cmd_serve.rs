//! `washpro serve`: run the controller in the foreground.

use futures::StreamExt;
use tracing::{info, warn};
use washpro_config::Config;

use crate::adapters::open_scheduler;

/// Start the scheduler, report every change event and shut down on Ctrl-C.
pub(crate) async fn serve(config: &Config, start: Vec<String>) -> anyhow::Result<()> {
    let (scheduler, _host) = open_scheduler(config).await?;
    let list = scheduler.list_tasks().await?;
    info!(
        "washpro controller up: {} task(s) in {:?}",
        list.tasks.len(),
        config.storage.data_dir
    );

    let mut events = Box::pin(scheduler.subscribe_stream());

    for id in &start {
        match scheduler.run_task(id).await {
            Ok(()) => {}
            Err(e) => warn!("Could not start task '{}': {}", id, e),
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            event = events.next() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
        }
    }

    scheduler.shutdown().await;
    Ok(())
}
