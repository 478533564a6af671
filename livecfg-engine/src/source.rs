//! Tracked sources: one polling container per resolved declaration.
//!
//! A source owns its detection state and is the only writer of its published
//! value. Readers load the value through an `ArcSwapOption` and never wait on
//! a poll.
//!
//! File sources emit, per poll, at most one event:
//! - `CREATED` on the first successful decode (and again after a deletion)
//! - `MODIFIED` on later successful decodes
//! - `LOAD_FAILED` when the decoder rejects a stamp, once per stamp
//! - `DELETED` once when the file goes missing; the last value is kept
//!
//! Directory sources emit one event per changed child, created and modified
//! children first in name order, then deleted ones.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use livecfg_core::{
    ChangeEvent, DecodeError, EventKind, ResolvedDeclaration, SourceId, SourceKind, StampStrategy,
};
use livecfg_detect::{diff_snapshots, scan_dir, ChangeKind, FileProbe, FileStatus, Snapshot, Stamp};

use crate::bus::{panic_message, EventBus};
use crate::decoder::Decoder;
use crate::error::{io_err, EngineError};
use crate::status::SourceStatus;

/// The published value of a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue<V> {
    File(Arc<V>),
    /// Child file name to decoded value; mirrors the directory's decodable files.
    Directory(BTreeMap<String, Arc<V>>),
}

impl<V> SourceValue<V> {
    pub fn as_file(&self) -> Option<&Arc<V>> {
        match self {
            SourceValue::File(value) => Some(value),
            SourceValue::Directory(_) => None,
        }
    }

    pub fn entries(&self) -> Option<&BTreeMap<String, Arc<V>>> {
        match self {
            SourceValue::File(_) => None,
            SourceValue::Directory(entries) => Some(entries),
        }
    }

    pub fn entry(&self, name: &str) -> Option<&Arc<V>> {
        self.entries()?.get(name)
    }
}

/// What one poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub events: usize,
    pub decoded: usize,
    pub failed: usize,
}

/// A failure that has already been published.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    Decode(Stamp),
    Unreadable(String),
}

struct PollState {
    probe: FileProbe,
    /// Stamp of the last successful decode (file sources).
    stamp: Option<Stamp>,
    /// Whether CREATED has been published since the file last appeared.
    announced: bool,
    /// Child stamps as of the last scan (directory sources).
    snapshot: Snapshot,
    scanned: bool,
    reported: Option<Failure>,
}

#[derive(Default)]
struct Stats {
    last_error: Option<String>,
    last_loaded_at: Option<DateTime<Utc>>,
    loads: u64,
    failures: u64,
}

pub struct TrackedSource<V> {
    declaration: ResolvedDeclaration,
    decoder: Decoder<V>,
    bus: EventBus,
    value: ArcSwapOption<SourceValue<V>>,
    state: Mutex<PollState>,
    stats: Mutex<Stats>,
}

impl<V> fmt::Debug for TrackedSource<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedSource")
            .field("id", self.declaration.id())
            .field("kind", &self.declaration.kind())
            .field("path", &self.declaration.path())
            .finish()
    }
}

impl<V: Send + Sync + 'static> TrackedSource<V> {
    pub fn new(
        declaration: ResolvedDeclaration,
        decoder: Decoder<V>,
        bus: EventBus,
        strategy: StampStrategy,
    ) -> Self {
        Self {
            declaration,
            decoder,
            bus,
            value: ArcSwapOption::empty(),
            state: Mutex::new(PollState {
                probe: FileProbe::new(strategy),
                stamp: None,
                announced: false,
                snapshot: Snapshot::new(),
                scanned: false,
                reported: None,
            }),
            stats: Mutex::new(Stats::default()),
        }
    }

    pub fn id(&self) -> &SourceId {
        self.declaration.id()
    }

    pub fn kind(&self) -> SourceKind {
        self.declaration.kind()
    }

    pub fn path(&self) -> &Path {
        self.declaration.path()
    }

    pub fn declaration(&self) -> &ResolvedDeclaration {
        &self.declaration
    }

    /// Last successfully decoded value. Never blocks on a poll.
    pub fn get(&self) -> Option<Arc<SourceValue<V>>> {
        self.value.load_full()
    }

    pub fn last_error(&self) -> Option<String> {
        self.stats().last_error.clone()
    }

    pub fn status(&self) -> SourceStatus {
        let stats = self.stats();
        SourceStatus {
            id: self.id().clone(),
            kind: self.kind(),
            path: self.path().to_path_buf(),
            poll_interval_ms: u64::try_from(self.declaration.poll_interval().as_millis())
                .unwrap_or(u64::MAX),
            has_value: self.value.load().is_some(),
            last_error: stats.last_error.clone(),
            last_loaded_at: stats.last_loaded_at,
            loads: stats.loads,
            failures: stats.failures,
        }
    }

    /// Run one detection cycle on the calling thread.
    ///
    /// Performs blocking I/O and runs the decoder; the scheduler calls it on
    /// the blocking pool. Concurrent calls on the same source serialize.
    pub fn poll(&self) -> PollOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(source = %self.id(), "poll");
        let result = match self.kind() {
            SourceKind::File => self.poll_file(&mut state),
            SourceKind::Directory => self.poll_directory(&mut state),
        };
        match result {
            Ok(outcome) => outcome,
            Err(err) => self.unreadable(&mut state, err),
        }
    }

    /// Drive [`poll`](Self::poll) on this source's interval until `shutdown`
    /// flips to `true` or its sender is dropped.
    ///
    /// The first poll runs immediately. Shutdown is only observed between
    /// polls, so a poll in progress always completes.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.declaration.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let source = Arc::clone(&self);
                        if let Err(err) = tokio::task::spawn_blocking(move || source.poll()).await {
                            tracing::error!(source = %self.id(), error = %err, "poll task failed");
                        }
                    }
                }
            }
            tracing::debug!(source = %self.id(), "polling stopped");
        })
    }

    fn poll_file(&self, state: &mut PollState) -> Result<PollOutcome, EngineError> {
        let path = self.path();
        let status = state.probe.check(path, state.stamp.as_ref())?;
        let stamp = match status {
            FileStatus::Unchanged | FileStatus::StillDeleted => return Ok(PollOutcome::default()),
            FileStatus::Deleted => {
                state.announced = false;
                state.reported = None;
                tracing::info!(source = %self.id(), path = %path.display(), "source deleted, keeping last value");
                self.publish(ChangeEvent::new(self.id().clone(), path, EventKind::Deleted));
                return Ok(PollOutcome {
                    events: 1,
                    ..PollOutcome::default()
                });
            }
            FileStatus::Stale(stamp) => stamp,
        };

        if state.reported.as_ref() == Some(&Failure::Decode(stamp.clone())) {
            return Ok(PollOutcome::default());
        }
        let Some(bytes) = read_bytes(path)? else {
            // Removed after the stamp was read; the next poll reports it.
            return Ok(PollOutcome::default());
        };

        match self.decode(path, &bytes) {
            Ok(value) => {
                let kind = if state.announced {
                    EventKind::Modified
                } else {
                    EventKind::Created
                };
                self.value
                    .store(Some(Arc::new(SourceValue::File(Arc::new(value)))));
                state.stamp = Some(stamp);
                state.announced = true;
                state.reported = None;
                self.record(1, 0, None);
                tracing::info!(source = %self.id(), path = %path.display(), kind = %kind, "source loaded");
                self.publish(ChangeEvent::new(self.id().clone(), path, kind));
                Ok(PollOutcome {
                    events: 1,
                    decoded: 1,
                    failed: 0,
                })
            }
            Err(err) => {
                let message = err.to_string();
                state.reported = Some(Failure::Decode(stamp));
                self.record(0, 1, Some(message.clone()));
                tracing::warn!(source = %self.id(), path = %path.display(), error = %message, "decode failed, keeping last value");
                self.publish(
                    ChangeEvent::new(self.id().clone(), path, EventKind::LoadFailed)
                        .with_detail(message),
                );
                Ok(PollOutcome {
                    events: 1,
                    decoded: 0,
                    failed: 1,
                })
            }
        }
    }

    fn poll_directory(&self, state: &mut PollState) -> Result<PollOutcome, EngineError> {
        let dir = self.path();
        let current = scan_dir(dir, state.probe.strategy())?;
        let changes = diff_snapshots(&state.snapshot, &current);
        let first = !state.scanned;
        state.scanned = true;
        state.snapshot = current;
        if matches!(state.reported, Some(Failure::Unreadable(_))) {
            state.reported = None;
        }
        if changes.is_empty() && !first {
            return Ok(PollOutcome::default());
        }

        let mut entries = self
            .value
            .load_full()
            .and_then(|value| value.entries().cloned())
            .unwrap_or_default();
        let mut events = Vec::with_capacity(changes.len());
        let mut outcome = PollOutcome::default();
        let mut last_error = None;

        for change in changes {
            let child = dir.join(&change.name);
            if change.kind == ChangeKind::Deleted {
                entries.remove(&change.name);
                events.push(ChangeEvent::new(self.id().clone(), child, EventKind::Deleted));
                continue;
            }

            let decoded = match read_bytes(&child) {
                Ok(Some(bytes)) => self.decode(&child, &bytes),
                Ok(None) => {
                    // Gone since the scan: drop it now so the map mirrors the directory.
                    state.snapshot.remove(&change.name);
                    if entries.remove(&change.name).is_some() {
                        events.push(ChangeEvent::new(self.id().clone(), child, EventKind::Deleted));
                    }
                    continue;
                }
                Err(err) => Err(DecodeError::with_source(format!("unreadable: {err}"), err)),
            };
            match decoded {
                Ok(value) => {
                    let kind = if entries.contains_key(&change.name) {
                        EventKind::Modified
                    } else {
                        EventKind::Created
                    };
                    entries.insert(change.name, Arc::new(value));
                    outcome.decoded += 1;
                    tracing::info!(source = %self.id(), path = %child.display(), kind = %kind, "entry loaded");
                    events.push(ChangeEvent::new(self.id().clone(), child, kind));
                }
                Err(err) => {
                    let message = err.to_string();
                    outcome.failed += 1;
                    tracing::warn!(source = %self.id(), path = %child.display(), error = %message, "entry decode failed");
                    events.push(
                        ChangeEvent::new(self.id().clone(), child, EventKind::LoadFailed)
                            .with_detail(message.clone()),
                    );
                    last_error = Some(message);
                }
            }
        }

        self.value
            .store(Some(Arc::new(SourceValue::Directory(entries))));
        self.record(outcome.decoded as u64, outcome.failed as u64, last_error);
        outcome.events = events.len();
        for event in events {
            self.publish(event);
        }
        Ok(outcome)
    }

    fn unreadable(&self, state: &mut PollState, err: EngineError) -> PollOutcome {
        let message = err.to_string();
        let failure = Failure::Unreadable(message.clone());
        if state.reported.as_ref() == Some(&failure) {
            tracing::debug!(source = %self.id(), error = %message, "source still unreadable");
            return PollOutcome::default();
        }
        state.reported = Some(failure);
        self.record(0, 1, Some(message.clone()));
        tracing::warn!(source = %self.id(), path = %self.path().display(), error = %message, "source unreadable");
        self.publish(
            ChangeEvent::new(self.id().clone(), self.path(), EventKind::LoadFailed)
                .with_detail(message),
        );
        PollOutcome {
            events: 1,
            decoded: 0,
            failed: 1,
        }
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<V, DecodeError> {
        match catch_unwind(AssertUnwindSafe(|| (self.decoder)(path, bytes))) {
            Ok(result) => result,
            Err(panic) => Err(DecodeError::new(format!(
                "decoder panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        let delivery = self.bus.publish(&event);
        tracing::debug!(
            source = %event.source,
            kind = %event.kind,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "event published",
        );
    }

    fn record(&self, decoded: u64, failed: u64, error: Option<String>) {
        let mut stats = self.stats();
        stats.loads += decoded;
        stats.failures += failed;
        if decoded > 0 {
            stats.last_loaded_at = Some(Utc::now());
        }
        match error {
            Some(message) => stats.last_error = Some(message),
            None if decoded > 0 => stats.last_error = None,
            None => {}
        }
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, EngineError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}
