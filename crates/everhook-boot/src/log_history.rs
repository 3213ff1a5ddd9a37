//! Log history: the previous run's log is archived on startup and old
//! archives are pruned down to a retention count.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::error::BootError;

const ARCHIVE_PREFIX: &str = "log_";
const ARCHIVE_SUFFIX: &str = ".txt";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Archive directory plus the number of archives to keep.
#[derive(Debug, Clone)]
pub struct LogHistory {
    dir: PathBuf,
    keep: usize,
}

impl LogHistory {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Move `current` into the history directory as `log_<timestamp>.txt`.
    ///
    /// The timestamp is the file's last modification, which is when the
    /// previous run stopped writing it. Same-second archives get a zero-padded
    /// `_NNN` suffix so names keep sorting in archive order. Returns `None`
    /// when there is no previous log.
    pub fn archive(&self, current: &Path) -> Result<Option<PathBuf>, BootError> {
        let metadata = match fs::metadata(current) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BootError::log_io(current, e)),
        };

        fs::create_dir_all(&self.dir).map_err(|e| BootError::log_io(&self.dir, e))?;

        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        let stamp = DateTime::<Local>::from(modified).format(TIMESTAMP_FORMAT);
        let mut target = self
            .dir
            .join(format!("{ARCHIVE_PREFIX}{stamp}{ARCHIVE_SUFFIX}"));
        let mut n = 1;
        while target.exists() {
            target = self
                .dir
                .join(format!("{ARCHIVE_PREFIX}{stamp}_{n:03}{ARCHIVE_SUFFIX}"));
            n += 1;
        }

        fs::rename(current, &target).map_err(|e| BootError::log_io(current, e))?;
        debug!("Archived {} to {}", current.display(), target.display());
        Ok(Some(target))
    }

    /// Archived logs, oldest first.
    pub fn archived(&self) -> Result<Vec<PathBuf>, BootError> {
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = format!("{dir}/{ARCHIVE_PREFIX}*{ARCHIVE_SUFFIX}");

        let mut files = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                BootError::log_io(path, std::io::Error::from(e))
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Delete the oldest archives until at most `keep` remain. Returns the
    /// deleted files.
    pub fn enforce(&self) -> Result<Vec<PathBuf>, BootError> {
        let files = self.archived()?;
        let excess = files.len().saturating_sub(self.keep);
        let mut deleted = Vec::with_capacity(excess);

        for file in files.into_iter().take(excess) {
            info!(
                "log.txt history: keeping {} file(s) of history, deleting {}",
                self.keep,
                file.display()
            );
            fs::remove_file(&file).map_err(|e| BootError::log_io(&file, e))?;
            deleted.push(file);
        }

        Ok(deleted)
    }
}
