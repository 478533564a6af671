//! Engine-wide defaults threaded into engine construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Poll interval used by declarations that do not set their own.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a source's change stamp is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StampStrategy {
    /// Modification time plus length, read from file metadata.
    #[default]
    #[serde(alias = "modified_time")]
    Modified,
    /// SHA-256 of the full content.
    #[serde(alias = "content_hash")]
    Content,
}

/// Settings shared by every source built from one declaration set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(
        rename = "default_poll_interval_ms",
        with = "duration_ms",
        default = "default_poll_interval"
    )]
    pub default_poll_interval: Duration,
    #[serde(default)]
    pub stamp: StampStrategy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_poll_interval: DEFAULT_POLL_INTERVAL,
            stamp: StampStrategy::default(),
        }
    }
}

impl EngineSettings {
    pub fn with_default_poll_interval(mut self, interval: Duration) -> Self {
        self.default_poll_interval = interval;
        self
    }

    pub fn with_stamp(mut self, stamp: StampStrategy) -> Self {
        self.stamp = stamp;
        self
    }
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Serialize a `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(millis(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// Whole milliseconds, saturating at `u64::MAX`.
    pub(crate) fn millis(value: &Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Same as [`duration_ms`] for optional fields.
pub(crate) mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&super::duration_ms::millis(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
