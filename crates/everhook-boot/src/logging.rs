//! Tracing setup and the log file session.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use everhook_config::LoggingConfig;

use crate::error::BootError;
use crate::log_history::LogHistory;

/// Holds the log file writer. Dropping the session flushes and closes
/// `log.txt`.
#[must_use = "dropping the session closes the log file"]
pub struct LogSession {
    file: Option<PathBuf>,
    archived: Option<PathBuf>,
    errors: Vec<BootError>,
    _guard: Option<WorkerGuard>,
}

/// What `init` could set up before installing the subscriber.
struct Outputs {
    file: Option<(NonBlocking, WorkerGuard)>,
    archived: Option<PathBuf>,
    errors: Vec<BootError>,
}

impl LogSession {
    /// Install the global subscriber: a console layer and, unless `nolog`,
    /// a file layer writing `config.file`. The previous run's log is archived
    /// first.
    ///
    /// Log file problems never fail startup. A failed archive leaves the old
    /// log in place and the new run appends to it; a log file that cannot be
    /// opened leaves console output only. Either way the error is kept in
    /// [`errors`](Self::errors) for the caller to report once tracing is up.
    /// Only installing the subscriber itself can fail.
    pub fn init(config: &LoggingConfig, nolog: bool) -> Result<Self, BootError> {
        let filter = Self::filter(config);
        let console = fmt::layer().with_target(true).with_ansi(true);
        let outputs = Self::outputs(config, nolog);

        let (file, guard) = match outputs.file {
            Some((writer, guard)) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init()
                    .map_err(|e| BootError::Logging(e.to_string()))?;
                (Some(config.file.clone()), Some(guard))
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .try_init()
                    .map_err(|e| BootError::Logging(e.to_string()))?;
                (None, None)
            }
        };

        Ok(Self {
            file,
            archived: outputs.archived,
            errors: outputs.errors,
            _guard: guard,
        })
    }

    /// `RUST_LOG` if set and valid, otherwise the configured directive,
    /// otherwise `info`.
    pub fn filter(config: &LoggingConfig) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.filter_directive()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    fn outputs(config: &LoggingConfig, nolog: bool) -> Outputs {
        let mut outputs = Outputs {
            file: None,
            archived: None,
            errors: Vec::new(),
        };
        if nolog {
            return outputs;
        }

        let history = LogHistory::new(&config.history_dir, config.retained_history());
        match history.archive(&config.file) {
            Ok(archived) => outputs.archived = archived,
            Err(e) => outputs.errors.push(e),
        }
        match Self::open_file(&config.file) {
            Ok(file) => outputs.file = Some(file),
            Err(e) => outputs.errors.push(e),
        }
        outputs
    }

    /// Open `path` for appending behind a non-blocking writer.
    fn open_file(path: &Path) -> Result<(NonBlocking, WorkerGuard), BootError> {
        let (dir, name) = split_log_path(path)?;
        fs::create_dir_all(&dir).map_err(|e| BootError::log_io(&dir, e))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(&dir)
            .map_err(|e| BootError::Logging(e.to_string()))?;
        Ok(tracing_appender::non_blocking(appender))
    }

    /// The log file, `None` under `--nolog` or when it could not be opened.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Where the previous run's log was moved.
    pub fn archived(&self) -> Option<&Path> {
        self.archived.as_deref()
    }

    /// Log file problems hit while starting the session.
    pub fn errors(&self) -> &[BootError] {
        &self.errors
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String), BootError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            BootError::log_io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no file name"),
            )
        })?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}
