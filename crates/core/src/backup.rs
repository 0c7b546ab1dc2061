use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::BackupError;

/// Preserves an artifact before it is mutated. Best-effort: callers treat a
/// failure as a warning, never as a reason to stop.
pub trait Backup {
    /// Returns the backup location, or `None` when there was nothing to copy.
    fn backup(&self, path: &Path) -> Result<Option<PathBuf>, BackupError>;
}

/// Copies the artifact next to itself (or into `dir`) with a UTC timestamp
/// suffix, e.g. `daemon.json.20240101T120000.000Z.bak`. Existing backups are
/// never overwritten: a clashing name gets a counter, e.g. `...000Z.1.bak`.
#[derive(Debug, Clone, Default)]
pub struct TimestampedCopy {
    dir: Option<PathBuf>,
}

impl TimestampedCopy {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Claims a fresh backup path with `create_new`.
    fn reserve_destination(&self, path: &Path) -> Result<PathBuf, BackupError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        let mut attempt = 0u32;
        loop {
            let candidate = match attempt {
                0 => dir.join(format!("{file_name}.{stamp}.bak")),
                n => dir.join(format!("{file_name}.{stamp}.{n}.bak")),
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => return Ok(candidate),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => {
                    return Err(BackupError::Copy {
                        from: path.to_path_buf(),
                        to: candidate,
                        source,
                    })
                }
            }
        }
    }
}

impl Backup for TimestampedCopy {
    fn backup(&self, path: &Path) -> Result<Option<PathBuf>, BackupError> {
        if !path.exists() {
            return Ok(None);
        }
        if let Some(dir) = &self.dir {
            fs::create_dir_all(dir).map_err(|source| BackupError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        let destination = self.reserve_destination(path)?;
        fs::copy(path, &destination).map_err(|source| BackupError::Copy {
            from: path.to_path_buf(),
            to: destination.clone(),
            source,
        })?;
        Ok(Some(destination))
    }
}

/// Never writes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackup;

impl Backup for NoBackup {
    fn backup(&self, _path: &Path) -> Result<Option<PathBuf>, BackupError> {
        Ok(None)
    }
}
