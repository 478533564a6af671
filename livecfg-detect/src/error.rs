//! Error types for livecfg-detect.

use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while probing the filesystem.
#[derive(Debug, Error)]
pub enum DetectError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DetectError {
    /// True when the probed path does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            DetectError::Io { source, .. } => source.kind() == ErrorKind::NotFound,
        }
    }
}

/// Convenience constructor for [`DetectError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.into(),
        source,
    }
}
