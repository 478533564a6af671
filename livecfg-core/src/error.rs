//! Error types for livecfg-core.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or resolving source declarations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The manifest file did not exist at the expected path.
    #[error("manifest not found at {path}")]
    ManifestNotFound { path: PathBuf },

    /// A declaration resolved to a zero poll interval.
    #[error("source '{source_id}' has a zero poll interval")]
    InvalidInterval { source_id: String },

    /// A declaration carried an empty identifier.
    #[error("source identifier must not be empty")]
    EmptySourceId,

    /// Two declarations share the same identifier.
    #[error("source '{source_id}' is declared more than once")]
    DuplicateSource { source_id: String },
}

/// A decoder rejected the bytes it was handed.
///
/// Decoders are opaque to the engine; the only thing it keeps from a failure
/// is the message (for `LOAD_FAILED` events and status reporting) and the
/// optional underlying cause.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_yaml::Error> for DecodeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::with_source(format!("invalid YAML: {err}"), err)
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(format!("invalid JSON: {err}"), err)
    }
}

impl From<std::str::Utf8Error> for DecodeError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::with_source(format!("invalid UTF-8: {err}"), err)
    }
}
