//! Boot-related errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while bringing the process up or writing its
/// diagnostics.
#[derive(Debug, Error)]
pub enum BootError {
    /// Rotating, pruning or opening a log file failed.
    #[error("Log file operation failed on {path}: {source}")]
    LogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid glob pattern for the log history.
    #[error("Invalid log history pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The tracing subscriber could not be installed.
    #[error("Failed to set up logging: {0}")]
    Logging(String),

    /// Writing the crash report failed.
    #[error("Failed to write crash report to {path}: {source}")]
    CrashReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootError {
    pub fn log_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LogIo {
            path: path.into(),
            source,
        }
    }
}
