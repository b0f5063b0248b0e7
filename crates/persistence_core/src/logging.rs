//! Rolling file logger driven by `LoggingConfig`.
//!
//! # Responsibility
//! - Start one `flexi_logger` file logger per process from a validated
//!   `LoggingConfig`.
//! - Keep log lines metadata-only: class names, counts, durations and
//!   statuses, never object state.
//!
//! # Invariants
//! - A second init with an equal config is a no-op.
//! - A second init with a different config is rejected and leaves the
//!   active logger untouched.

use crate::config::{ConfigError, LoggingConfig};
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "persistence";

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    config: LoggingConfig,
    _handle: LoggerHandle,
}

/// Logger bootstrap failures.
#[derive(Debug)]
pub enum LoggingError {
    Config(ConfigError),
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    Backend(FlexiLoggerError),
    /// A logger with a different config already runs in this process.
    AlreadyInitialized {
        active: Box<LoggingConfig>,
        requested: Box<LoggingConfig>,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::CreateDir { dir, source } => {
                write!(f, "failed to create log dir `{}`: {source}", dir.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logging already runs at `{}` level {}; refusing `{}` level {}",
                active.dir.display(),
                active.level.as_str(),
                requested.dir.display(),
                requested.level.as_str()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            Self::AlreadyInitialized { .. } => None,
        }
    }
}

impl From<ConfigError> for LoggingError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Starts the process-wide file logger described by `config`.
///
/// # Errors
/// - `Config` when `config` fails validation.
/// - `CreateDir` / `Backend` when the log directory or backend cannot start.
/// - `AlreadyInitialized` when a logger with another config is running.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    config.validate()?;

    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(config))?;
    if active.config != *config {
        return Err(LoggingError::AlreadyInitialized {
            active: Box::new(active.config.clone()),
            requested: Box::new(config.clone()),
        });
    }
    Ok(())
}

/// Config of the running logger, `None` before `init_logging` succeeds.
pub fn active_logging() -> Option<LoggingConfig> {
    ACTIVE_LOGGER.get().map(|active| active.config.clone())
}

fn start_logger(config: &LoggingConfig) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&config.dir).map_err(|source| LoggingError::CreateDir {
        dir: config.dir.clone(),
        source,
    })?;

    let handle = Logger::try_with_str(config.level.as_str())
        .map_err(LoggingError::Backend)?
        .log_to_file(file_spec(config))
        .rotate(
            Criterion::Size(config.max_file_size_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    info!(
        "event=logging_init module=logging status=ok version={} level={} dir={} max_files={}",
        env!("CARGO_PKG_VERSION"),
        config.level.as_str(),
        config.dir.display(),
        config.max_files
    );

    Ok(ActiveLogger {
        config: config.clone(),
        _handle: handle,
    })
}

fn file_spec(config: &LoggingConfig) -> FileSpec {
    FileSpec::default()
        .directory(config.dir.as_path())
        .basename(LOG_FILE_BASENAME)
}

#[cfg(test)]
mod tests {
    use super::{active_logging, init_logging, LoggingError};
    use crate::config::{ConfigError, LogLevel, LoggingConfig};

    #[test]
    fn invalid_config_is_rejected_before_any_logger_starts() {
        let mut config = LoggingConfig::new("/tmp/objects-logs");
        config.max_files = 0;
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::Config(ConfigError::InvalidLogRotation))
        ));
        assert!(matches!(
            init_logging(&LoggingConfig::new("relative/logs")),
            Err(LoggingError::Config(ConfigError::RelativeLogDir(_)))
        ));
    }

    #[test]
    fn same_config_is_idempotent_and_other_configs_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::new(dir.path()).with_level(LogLevel::Info);

        init_logging(&config).unwrap();
        init_logging(&config.clone()).unwrap();
        assert!(dir.path().is_dir());

        let louder = config.clone().with_level(LogLevel::Trace);
        assert!(matches!(
            init_logging(&louder),
            Err(LoggingError::AlreadyInitialized { .. })
        ));
        assert_eq!(active_logging(), Some(config));
    }
}
