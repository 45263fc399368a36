//! Structured log pipeline: processor chain, renderers, and sinks.
//!
//! Provides structured logging with console output and an optional
//! rotating file sink:
//! - every event passes through a fixed, ordered processor chain
//!   (level/logger, microsecond UTC timestamp, exception info, process
//!   context) before rendering
//! - the renderer (JSON or colorized text) is selected once at setup
//! - the file sink rotates at a byte threshold with a bounded backup
//!   count and always receives a plain rendering
//! - [`mask_sensitive`] is available to callers that log
//!   credential-bearing structures

mod mask;
mod pipeline;
mod rotate;

pub use mask::{MASK, mask_sensitive};
pub use rotate::RotatingFileWriter;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Settings;
use pipeline::{ContextFields, PipelineLayer};

/// Rotate the log file once it would exceed this many bytes.
const MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Number of rotated backups to retain.
const LOG_FILE_BACKUPS: usize = 5;

/// Logging setup failure.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log file (or its directory) could not be opened.
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping it flushes and closes the non-blocking file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file_sink", &self._file_guard.is_some())
            .finish()
    }
}

/// Installs the global log pipeline according to the settings snapshot.
///
/// The console sink is always present; a rotating file sink is added when
/// `LOG_FILE` is configured. `RUST_LOG` overrides the configured level.
///
/// # Errors
///
/// Returns a [`LoggingError`] if the log file cannot be opened or a
/// global subscriber is already installed.
pub fn init_logging(settings: &Settings) -> Result<LoggingGuard, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    let (file_writer, file_guard) = match &settings.log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let rotating = RotatingFileWriter::new(path, MAX_LOG_FILE_BYTES, LOG_FILE_BACKUPS)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(rotating);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    let layer = PipelineLayer::new(
        ContextFields {
            service: settings.app_name.clone(),
            version: settings.version.clone(),
            environment: settings.environment.clone(),
        },
        settings.log_format,
        file_writer,
    );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        level = %settings.log_level,
        format = ?settings.log_format,
        file = ?settings.log_file,
        environment = %settings.environment,
        "logging configured"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
