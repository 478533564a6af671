use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use livecfg_core::{
    manifest::{self, base_dir_of},
    DecodeError, DecoderId, EngineSettings, Manifest, SourceDeclaration, SourceId,
};

use crate::bus::EventBus;
use crate::decoder::DecoderTable;
use crate::error::EngineError;
use crate::source::{SourceValue, TrackedSource};
use crate::status::SourceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Built,
    Running,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Built => write!(f, "built"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Collects settings, decoders and declarations for an [`Engine`].
pub struct EngineBuilder<V> {
    settings: EngineSettings,
    decoders: DecoderTable<V>,
    declarations: Vec<SourceDeclaration>,
    base_dir: PathBuf,
}

impl<V: Send + Sync + 'static> Default for EngineBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync + 'static> EngineBuilder<V> {
    pub fn new() -> Self {
        Self {
            settings: EngineSettings::default(),
            decoders: DecoderTable::new(),
            declarations: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn decoder<F>(mut self, id: impl Into<DecoderId>, decoder: F) -> Self
    where
        F: Fn(&Path, &[u8]) -> Result<V, DecodeError> + Send + Sync + 'static,
    {
        self.decoders.register(id, decoder);
        self
    }

    pub fn source(mut self, declaration: SourceDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn sources(mut self, declarations: impl IntoIterator<Item = SourceDeclaration>) -> Self {
        self.declarations.extend(declarations);
        self
    }

    /// Directory that relative declaration paths are joined onto.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Take settings and declarations from a parsed manifest.
    pub fn manifest(mut self, manifest: Manifest, base_dir: impl Into<PathBuf>) -> Self {
        self.settings = manifest.settings;
        self.declarations.extend(manifest.sources);
        self.base_dir = base_dir.into();
        self
    }

    /// Load a manifest file; relative paths resolve against its directory.
    pub fn manifest_file(self, path: &Path) -> Result<Self, EngineError> {
        let loaded = manifest::load_at(path)?;
        Ok(self.manifest(loaded, base_dir_of(path)))
    }

    pub fn build(self) -> Result<Engine<V>, EngineError> {
        let resolved =
            manifest::resolve_all(&self.declarations, &self.settings, &self.base_dir)?;
        let bus = EventBus::new();
        let mut sources = Vec::with_capacity(resolved.len());
        let mut index = HashMap::with_capacity(resolved.len());
        for declaration in resolved {
            let decoder = self.decoders.get(declaration.decoder()).ok_or_else(|| {
                EngineError::UnknownDecoder {
                    source_id: declaration.id().to_string(),
                    decoder: declaration.decoder().to_string(),
                }
            })?;
            index.insert(declaration.id().clone(), sources.len());
            sources.push(Arc::new(TrackedSource::new(
                declaration,
                decoder,
                bus.clone(),
                self.settings.stamp,
            )));
        }
        tracing::debug!(sources = sources.len(), "engine built");
        Ok(Engine {
            bus,
            sources,
            index,
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Built,
                shutdown: None,
                tasks: Vec::new(),
            }),
        })
    }
}

struct Lifecycle {
    state: EngineState,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the event bus and every tracked source built from one declaration set.
pub struct Engine<V> {
    bus: EventBus,
    sources: Vec<Arc<TrackedSource<V>>>,
    index: HashMap<SourceId, usize>,
    lifecycle: Mutex<Lifecycle>,
}

impl<V> fmt::Debug for Engine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("sources", &self.sources)
            .field("bus", &self.bus)
            .finish()
    }
}

impl<V: Send + Sync + 'static> Engine<V> {
    pub fn builder() -> EngineBuilder<V> {
        EngineBuilder::new()
    }

    /// Spawn one polling task per source on the current tokio runtime.
    pub fn start(&self) -> Result<(), EngineError> {
        tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let mut lifecycle = self.lifecycle();
        match lifecycle.state {
            EngineState::Built => {}
            EngineState::Running => return Err(EngineError::AlreadyStarted),
            EngineState::Stopped => return Err(EngineError::Stopped),
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        lifecycle.tasks = self
            .sources
            .iter()
            .map(|source| Arc::clone(source).spawn(shutdown_rx.clone()))
            .collect();
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.state = EngineState::Running;
        tracing::info!(sources = self.sources.len(), "engine started");
        Ok(())
    }

    /// Stop every source and wait for in-flight polls to finish.
    ///
    /// Idempotent. Once stopped the engine cannot be restarted.
    pub async fn stop(&self) {
        let (shutdown, tasks) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state == EngineState::Stopped {
                return;
            }
            lifecycle.state = EngineState::Stopped;
            (
                lifecycle.shutdown.take(),
                std::mem::take(&mut lifecycle.tasks),
            )
        };
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        for task in tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    tracing::error!(error = %err, "source task failed");
                }
            }
        }
        tracing::info!("engine stopped");
    }

    /// Current value of source `id`.
    ///
    /// `Ok(None)` means the source is running but has not loaded a value yet.
    pub fn get(&self, id: &str) -> Result<Option<Arc<SourceValue<V>>>, EngineError> {
        match self.state() {
            EngineState::Built => return Err(EngineError::NotStarted),
            EngineState::Stopped => return Err(EngineError::Stopped),
            EngineState::Running => {}
        }
        self.source(id).map(|source| source.get())
    }

    /// The tracked source registered as `id`, in any lifecycle state.
    pub fn source(&self, id: &str) -> Result<&Arc<TrackedSource<V>>, EngineError> {
        self.index
            .get(&SourceId::from(id))
            .map(|&i| &self.sources[i])
            .ok_or_else(|| EngineError::UnknownSource(id.to_string()))
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Source identifiers in declaration order.
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id().clone()).collect()
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle().state
    }

    pub fn status(&self) -> Vec<SourceStatus> {
        self.sources.iter().map(|s| s.status()).collect()
    }
}

impl<V> Engine<V> {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Drop for Engine<V> {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let running = lifecycle.tasks.iter().filter(|t| !t.is_finished()).count();
        if running > 0 {
            tracing::warn!(tasks = running, "engine dropped without stop, aborting source tasks");
        }
        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(true);
        }
        for task in lifecycle.tasks.drain(..) {
            task.abort();
        }
    }
}
