//! washpro - embedded task controller
//!
//! Main entry point for the washpro CLI.

mod adapters;
mod cli;
mod cmd_serve;
mod cmd_task;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use washpro_config::{ConfigLoader, ConfigValidator, LoggingConfig};

use crate::cli::{Cli, Commands};

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let level = match logging.level.trim() {
        "" => "info",
        level => level,
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Console layer (human-readable, to stderr so command output stays clean)
    let console = fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    let file = if logging.file_logging {
        std::fs::create_dir_all(&logging.log_dir)
            .with_context(|| format!("creating log directory {:?}", logging.log_dir))?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("washpro")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&logging.log_dir)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keeps the background writer alive for the program duration.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, found) = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    init_tracing(&config.logging)?;
    if !found {
        info!("No configuration at {:?}, using defaults", cli.config);
    }

    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        for err in &validation.errors {
            error!("{}", err);
        }
        anyhow::bail!("invalid configuration ({} error(s))", validation.errors.len());
    }

    match cli.command {
        Commands::Serve { start } => cmd_serve::serve(&config, start).await,
        Commands::Task { action } => cmd_task::handle_task_command(&config, action).await,
    }
}
