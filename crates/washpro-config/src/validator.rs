//! Configuration validation.

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.storage.data_dir.as_os_str().is_empty() {
            result.add_error("storage.data_dir", "data_dir cannot be empty");
        }

        if config.scheduler.event_capacity == 0 {
            result.add_error("scheduler.event_capacity", "event_capacity must be greater than 0");
        }
        if config.scheduler.control_queue_capacity == 0 {
            result.add_error(
                "scheduler.control_queue_capacity",
                "control_queue_capacity must be greater than 0",
            );
        }

        match config.sandbox.hook_instruction_interval {
            0 => result.add_error(
                "sandbox.hook_instruction_interval",
                "hook_instruction_interval must be greater than 0",
            ),
            n if n > 1_000_000 => result.add_warning(
                "sandbox.hook_instruction_interval",
                "hook_instruction_interval is very high (>1000000), busy scripts will react slowly to stop requests",
            ),
            _ => {}
        }

        if config.logging.level.trim().is_empty() {
            result.add_warning("logging.level", "level is empty, falling back to 'info'");
        }

        result
    }
}
