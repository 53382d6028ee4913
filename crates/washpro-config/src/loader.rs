//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

/// Loads TOML configuration, substituting `${VAR}` references from the
/// environment and expanding `~` in path settings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let substituted = Self::substitute_env(content)?;
        let mut config: Config = toml::from_str(&substituted)?;
        config.storage.data_dir = Self::expand_pathbuf(&config.storage.data_dir);
        config.logging.log_dir = Self::expand_pathbuf(&config.logging.log_dir);
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<(Config, bool), ConfigError> {
        if path.exists() {
            Ok((Self::load(path)?, true))
        } else {
            Ok((Config::default(), false))
        }
    }

    fn substitute_env(content: &str) -> Result<String, ConfigError> {
        let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut missing = None;
        let substituted = pattern.replace_all(content, |caps: &regex::Captures<'_>| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarNotSet(var)),
            None => Ok(substituted.into_owned()),
        }
    }

    /// Expand shell-style paths (e.g., `~/.washpro`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }

    fn expand_pathbuf(path: &Path) -> PathBuf {
        match path.to_str() {
            Some(s) => PathBuf::from(Self::expand_path(s)),
            None => path.to_path_buf(),
        }
    }
}
