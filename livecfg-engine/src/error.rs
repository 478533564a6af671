use std::path::PathBuf;

use thiserror::Error;

use livecfg_core::ConfigError;
use livecfg_detect::DetectError;

/// Error surface for engine construction, lifecycle and polling.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("source '{source_id}' names unknown decoder '{decoder}'")]
    UnknownDecoder { source_id: String, decoder: String },

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("engine has not been started")]
    NotStarted,

    #[error("engine has been stopped")]
    Stopped,

    #[error("engine is already running")]
    AlreadyStarted,

    #[error("engine must be started from within a tokio runtime")]
    NoRuntime,
}

/// A subscriber handler failed while processing an event.
#[derive(Debug, Error)]
#[error("subscriber failed: {message}")]
pub struct SubscriberError {
    message: String,
}

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for SubscriberError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for SubscriberError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
