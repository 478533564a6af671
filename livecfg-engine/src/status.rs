use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use livecfg_core::{SourceId, SourceKind};

/// Point-in-time view of one tracked source, for health endpoints and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub id: SourceId,
    pub kind: SourceKind,
    pub path: PathBuf,
    pub poll_interval_ms: u64,
    pub has_value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_loaded_at: Option<DateTime<Utc>>,
    /// Successful decodes since the engine was built.
    pub loads: u64,
    /// Failed decodes or unreadable polls since the engine was built.
    pub failures: u64,
}
