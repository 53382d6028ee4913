//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn washpro_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".washpro"))
        .unwrap_or_else(|| PathBuf::from("/tmp/washpro"))
}

/// Where task records and scripts are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    washpro_dir().join("data")
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Buffered change events per subscriber before the oldest are dropped.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Pending start/stop requests issued by scripts.
    #[serde(default = "default_control_queue_capacity")]
    pub control_queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            control_queue_capacity: default_control_queue_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    64
}

fn default_control_queue_capacity() -> usize {
    256
}

/// Script sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// VM instructions executed between cancellation checks.
    #[serde(default = "default_hook_instruction_interval")]
    pub hook_instruction_interval: u32,

    /// Interpreter memory limit in bytes, 0 = unlimited.
    #[serde(default)]
    pub memory_limit_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            hook_instruction_interval: default_hook_instruction_interval(),
            memory_limit_bytes: 0,
        }
    }
}

fn default_hook_instruction_interval() -> u32 {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Also write a daily-rotated log file.
    #[serde(default)]
    pub file_logging: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging: false,
            log_dir: default_log_dir(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    washpro_dir().join("logs")
}
