//! Logging setup for TerraStream binaries.
//!
//! Installs a `tracing` subscriber that writes to a log file (truncated at
//! start-up) and, optionally, to stderr. Filtering follows `RUST_LOG` and
//! defaults to `info`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "terrastream.log";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Keeps the background log writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    log_path: PathBuf,
}

impl LoggingGuard {
    /// Path of the log file being written.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Install the global subscriber.
///
/// Creates `log_dir` if needed and truncates `log_dir/log_file`. When
/// `console` is set, events are also written to stderr.
pub fn init_logging(
    log_dir: &Path,
    log_file: &str,
    console: bool,
) -> Result<LoggingGuard, LoggingError> {
    let log_path = log_dir.join(log_file);
    let io_error = |source| LoggingError::Io {
        path: log_path.clone(),
        source,
    };
    fs::create_dir_all(log_dir).map_err(io_error)?;
    fs::write(&log_path, "").map_err(io_error)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(true)
            .compact()
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_path,
    })
}

/// `<user data dir>/terrastream/logs`, or `logs` when the platform has none.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("terrastream").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_dir() {
        assert!(default_log_dir().ends_with("logs"));
    }

    #[test]
    fn test_init_creates_and_truncates_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested/logs");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DEFAULT_LOG_FILE), "stale").unwrap();

        // Another test may already own the global subscriber; the file is
        // prepared either way.
        match init_logging(&dir, DEFAULT_LOG_FILE, false) {
            Ok(guard) => assert_eq!(guard.log_path(), dir.join(DEFAULT_LOG_FILE)),
            Err(LoggingError::AlreadyInitialized) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert_eq!(fs::read_to_string(dir.join(DEFAULT_LOG_FILE)).unwrap(), "");
    }
}
