//! Pluggable decode functions, keyed by [`DecoderId`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use livecfg_core::{DecodeError, DecoderId};

/// Converts the raw bytes of one file into a value.
pub type Decoder<V> = Arc<dyn Fn(&Path, &[u8]) -> Result<V, DecodeError> + Send + Sync>;

/// Decoders available to an engine under construction.
pub struct DecoderTable<V> {
    entries: HashMap<DecoderId, Decoder<V>>,
}

impl<V> Default for DecoderTable<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> fmt::Debug for DecoderTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.entries.keys().map(DecoderId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("DecoderTable").field("ids", &ids).finish()
    }
}

impl<V> DecoderTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decoder` under `id`, replacing any earlier registration.
    pub fn register<F>(&mut self, id: impl Into<DecoderId>, decoder: F)
    where
        F: Fn(&Path, &[u8]) -> Result<V, DecodeError> + Send + Sync + 'static,
    {
        self.entries.insert(id.into(), Arc::new(decoder));
    }

    pub fn get(&self, id: &DecoderId) -> Option<Decoder<V>> {
        self.entries.get(id).cloned()
    }

    pub fn contains(&self, id: &DecoderId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ready-made serde adapters.
pub mod decoders {
    use std::path::Path;

    use serde::de::DeserializeOwned;

    use livecfg_core::DecodeError;

    pub fn yaml<T>() -> impl Fn(&Path, &[u8]) -> Result<T, DecodeError> + Send + Sync + 'static
    where
        T: DeserializeOwned + 'static,
    {
        |_path: &Path, bytes: &[u8]| serde_yaml::from_slice(bytes).map_err(DecodeError::from)
    }

    pub fn json<T>() -> impl Fn(&Path, &[u8]) -> Result<T, DecodeError> + Send + Sync + 'static
    where
        T: DeserializeOwned + 'static,
    {
        |_path: &Path, bytes: &[u8]| serde_json::from_slice(bytes).map_err(DecodeError::from)
    }

    /// Raw UTF-8 text.
    pub fn utf8() -> impl Fn(&Path, &[u8]) -> Result<String, DecodeError> + Send + Sync + 'static {
        |_path: &Path, bytes: &[u8]| {
            std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(DecodeError::from)
        }
    }
}
