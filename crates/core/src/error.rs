use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why the current state of an artifact could not be determined.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("tool not available: {tool}")]
    ToolUnavailable { tool: String },
    #[error("cannot parse {}: {detail}", .path.display())]
    Malformed { path: PathBuf, detail: String },
    #[error("{what} is not supported on this host")]
    Unsupported { what: String },
    #[error("{what} is not present")]
    Missing { what: String },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },
}

impl ProbeError {
    pub fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Nothing to do on this host: an optional subsystem is not installed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ToolUnavailable { .. } | Self::Unsupported { .. })
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("cannot apply: {0}")]
    Precondition(String),
}

impl ApplyError {
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to create backup directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("backup unavailable: {0}")]
    Unavailable(String),
}
