//! CLI definitions for washpro.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// washpro CLI.
#[derive(Parser)]
#[command(name = "washpro")]
#[command(about = "Embedded task controller with sandboxed Lua scripts")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "washpro.toml", global = true, env = "WASHPRO_CONFIG")]
    pub config: PathBuf,

    /// Override the data directory from the configuration
    #[arg(long, global = true, env = "WASHPRO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the controller in the foreground until Ctrl-C
    Serve {
        /// Tasks to run once the controller is up
        #[arg(long = "start", value_name = "ID")]
        start: Vec<String>,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum TaskAction {
    /// Create a new task
    Create {
        /// Task name
        name: String,
    },

    /// List all tasks
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show a task together with its script
    Show {
        /// Task ID
        id: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print a task's script
    Script {
        /// Task ID
        id: String,
    },

    /// Rename a task and/or replace its script
    Save {
        /// Task ID
        id: String,

        /// New task name
        #[arg(short, long)]
        name: Option<String>,

        /// Read the script from this file
        #[arg(short, long, conflicts_with_all = ["content", "clear"])]
        file: Option<PathBuf>,

        /// Script text
        #[arg(long, conflicts_with = "clear")]
        content: Option<String>,

        /// Remove the script
        #[arg(long)]
        clear: bool,
    },

    /// Run a task in the foreground until every execution has finished
    Run {
        /// Task ID
        id: String,

        /// Stop the task after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Mark a task stopped
    Stop {
        /// Task ID
        id: String,
    },

    /// Delete a task and its script
    Delete {
        /// Task ID
        id: String,
    },

    /// List the builtins available to scripts
    Builtins,
}
