//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe how sessions open their SQLite storage.
//! - Describe optional file logging setup.
//!
//! # Invariants
//! - Every field has a default, so `{}` is a complete configuration.
//! - `DbConfig::path = None` selects an in-memory database.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub db: DbConfig,
    pub log: Option<LogConfig>,
}

/// Storage options applied when a session opens its connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DbConfig {
    /// Returns an in-memory configuration with default pragmas.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Returns a file-backed configuration with default pragmas.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// File logging options, consumed by `logging::init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_level_string")]
    pub level: String,
    pub dir: PathBuf,
}

impl LogConfig {
    pub fn new(level: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            level: level.into(),
            dir: dir.into(),
        }
    }
}

fn default_level_string() -> String {
    default_log_level().to_string()
}

impl CoreConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    /// - `Parse` when the document is malformed or has unknown fields.
    /// - `Invalid` when a value breaks a field rule.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.db.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("db.path cannot be empty".to_string()));
            }
        }
        if let Some(log) = &self.log {
            if !log.dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log.dir must be an absolute path, got `{}`",
                    log.dir.display()
                )));
            }
        }
        Ok(())
    }
}
