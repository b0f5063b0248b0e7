//! Manager configuration.
//!
//! # Responsibility
//! - Describe where a SQLite-backed manager stores objects and how it logs.
//! - Parse and validate JSON configuration documents.

use crate::db::DbOptions;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Storage target of a SQLite-backed manager.
///
/// JSON form: `"memory"` or `{ "file": "/path/to/objects.sqlite3" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    #[default]
    Memory,
    File(PathBuf),
}

/// Verbosity of the rolling file logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[serde(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `debug` in debug builds, `info` in release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Info
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Optional file logging bootstrap.
///
/// JSON form: `{ "dir": "/var/log/app", "level": "info", "max_files": 5 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "LogLevel::for_build")]
    pub level: LogLevel,
    /// Absolute directory for rolling log files.
    pub dir: PathBuf,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    /// Rotated files kept next to the active one.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl LoggingConfig {
    /// Logs under `dir` with the build's default level and rotation.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            level: LogLevel::for_build(),
            dir: dir.into(),
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyLogDir);
        }
        if !self.dir.is_absolute() {
            return Err(ConfigError::RelativeLogDir(self.dir.clone()));
        }
        if self.max_file_size_bytes == 0 || self.max_files == 0 {
            return Err(ConfigError::InvalidLogRotation);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    #[serde(default)]
    pub storage: StorageLocation,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            storage: StorageLocation::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            logging: None,
        }
    }
}

impl ManagerConfig {
    /// In-memory storage, default timeout, no logging.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File storage at `path` with defaults for everything else.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let StorageLocation::File(path) = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyStoragePath);
            }
        }
        match &self.logging {
            Some(logging) => logging.validate(),
            None => Ok(()),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: self.busy_timeout(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_max_file_size_bytes() -> u64 {
    DEFAULT_MAX_LOG_FILE_SIZE_BYTES
}

fn default_max_files() -> usize {
    DEFAULT_MAX_LOG_FILES
}

/// Invalid configuration documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    EmptyStoragePath,
    EmptyLogDir,
    RelativeLogDir(PathBuf),
    /// Rotation needs a non-zero file size and file count.
    InvalidLogRotation,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid manager config: {message}"),
            Self::EmptyStoragePath => write!(f, "storage file path cannot be empty"),
            Self::EmptyLogDir => write!(f, "logging dir cannot be empty"),
            Self::RelativeLogDir(dir) => {
                write!(f, "logging dir must be absolute, got `{}`", dir.display())
            }
            Self::InvalidLogRotation => {
                write!(f, "logging max_file_size_bytes and max_files must be non-zero")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, LogLevel, LoggingConfig, ManagerConfig, StorageLocation};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ManagerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ManagerConfig::in_memory());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn parses_file_storage_and_logging() {
        let config = ManagerConfig::from_json_str(
            r#"{
                "storage": { "file": "/tmp/objects.sqlite3" },
                "busy_timeout_ms": 250,
                "logging": { "level": "warning", "dir": "/tmp/logs", "max_files": 2 }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.storage,
            StorageLocation::File(PathBuf::from("/tmp/objects.sqlite3"))
        );
        assert_eq!(config.db_options().busy_timeout, Duration::from_millis(250));
        let logging = config.logging.unwrap();
        assert_eq!(logging.level, LogLevel::Warn);
        assert_eq!(logging.max_files, 2);
        assert_eq!(logging.max_file_size_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn logging_section_needs_an_absolute_dir_and_rotation() {
        assert_eq!(
            ManagerConfig::from_json_str(r#"{"logging": {"dir": "logs"}}"#),
            Err(ConfigError::RelativeLogDir(PathBuf::from("logs")))
        );
        assert_eq!(
            ManagerConfig::from_json_str(r#"{"logging": {"dir": "/tmp/logs", "max_files": 0}}"#),
            Err(ConfigError::InvalidLogRotation)
        );
        assert!(matches!(
            ManagerConfig::from_json_str(r#"{"logging": {"dir": "/tmp/logs", "level": "loud"}}"#),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            LoggingConfig::new("/tmp/logs").level,
            LogLevel::for_build()
        );
    }

    #[test]
    fn rejects_unknown_keys_and_empty_paths() {
        assert!(matches!(
            ManagerConfig::from_json_str(r#"{"store": "memory"}"#),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            ManagerConfig::from_json_str(r#"{"storage": {"file": ""}}"#),
            Err(ConfigError::EmptyStoragePath)
        );
        assert_eq!(
            ManagerConfig::from_json_str(r#"{"logging": {"dir": ""}}"#),
            Err(ConfigError::EmptyLogDir)
        );
    }
}
