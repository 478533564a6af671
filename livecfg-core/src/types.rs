//! Domain types for livecfg.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Declarations are serializable via serde so they can come from a manifest.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::settings::{option_duration_ms, EngineSettings};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifies one declared source; carried on every event it produces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Names the decode function a source is bound to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecoderId(pub String);

impl DecoderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DecoderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DecoderId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Whether a source tracks one file or the files directly inside a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    File,
    Directory,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Directory => write!(f, "directory"),
        }
    }
}

/// What happened to a tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    LoadFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "CREATED"),
            EventKind::Modified => write!(f, "MODIFIED"),
            EventKind::Deleted => write!(f, "DELETED"),
            EventKind::LoadFailed => write!(f, "LOAD_FAILED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Static description of one watched path, as written by the caller or read
/// from a manifest. Call [`SourceDeclaration::resolve`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDeclaration {
    pub id: SourceId,
    pub path: PathBuf,
    pub decoder: DecoderId,
    #[serde(
        rename = "poll_interval_ms",
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_ms"
    )]
    pub poll_interval: Option<Duration>,
    #[serde(default)]
    pub kind: SourceKind,
}

impl SourceDeclaration {
    /// A single-file source.
    pub fn file(
        id: impl Into<SourceId>,
        path: impl Into<PathBuf>,
        decoder: impl Into<DecoderId>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            decoder: decoder.into(),
            poll_interval: None,
            kind: SourceKind::File,
        }
    }

    /// A directory-of-files source.
    pub fn directory(
        id: impl Into<SourceId>,
        path: impl Into<PathBuf>,
        decoder: impl Into<DecoderId>,
    ) -> Self {
        Self {
            kind: SourceKind::Directory,
            ..Self::file(id, path, decoder)
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Fix the path and interval for the life of the source.
    ///
    /// Relative paths are joined onto `base_dir`, and a relative `base_dir`
    /// onto the current working directory, so the result is always absolute.
    /// The path is normalised lexically and does not need to exist yet.
    pub fn resolve(
        &self,
        settings: &EngineSettings,
        base_dir: &Path,
    ) -> Result<ResolvedDeclaration, ConfigError> {
        if self.id.0.trim().is_empty() {
            return Err(ConfigError::EmptySourceId);
        }
        let poll_interval = self.poll_interval.unwrap_or(settings.default_poll_interval);
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidInterval {
                source_id: self.id.0.clone(),
            });
        }
        let joined = if self.path.is_absolute() {
            self.path.clone()
        } else if base_dir.is_absolute() {
            base_dir.join(&self.path)
        } else {
            std::env::current_dir()?.join(base_dir).join(&self.path)
        };
        Ok(ResolvedDeclaration {
            id: self.id.clone(),
            path: normalize(&joined),
            decoder: self.decoder.clone(),
            poll_interval,
            kind: self.kind,
        })
    }
}

/// A declaration whose path and interval are final. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeclaration {
    id: SourceId,
    path: PathBuf,
    decoder: DecoderId,
    poll_interval: Duration,
    kind: SourceKind,
}

impl ResolvedDeclaration {
    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn decoder(&self) -> &DecoderId {
        &self.decoder
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One detected change, published once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub source: SourceId,
    /// The affected file: the tracked path itself, or the child for directory sources.
    pub path: PathBuf,
    pub kind: EventKind,
    pub observed_at: DateTime<Utc>,
    /// Decoder message for `LOAD_FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChangeEvent {
    pub fn new(source: SourceId, path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            source,
            path: path.into(),
            kind,
            observed_at: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
