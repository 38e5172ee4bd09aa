//! CLI error handling with user-friendly messages.

use std::path::PathBuf;
use std::process;

use terrastream::config::ConfigFileError;
use terrastream::layer::LayerError;
use terrastream::logging::LoggingError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(#[from] LoggingError),

    #[error("Configuration error in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigFileError,
    },

    #[error("Refusing to overwrite {0} (use --force)")]
    FileExists(PathBuf),

    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: ConfigFileError,
    },

    #[error("Failed to build tile layer: {0}")]
    Layer(#[from] LayerError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl CliError {
    /// Print the error and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        if let CliError::Config { .. } = self {
            eprintln!();
            eprintln!("Run 'terrastream config defaults' for a commented example.");
        }
        process::exit(1)
    }
}
