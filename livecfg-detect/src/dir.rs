//! Directory snapshots and child-level diffs.
//!
//! A snapshot covers regular files directly inside the directory. Nested
//! directories and other non-file entries are not tracked.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use livecfg_core::{EventKind, StampStrategy};

use crate::error::{io_err, DetectError};
use crate::stamp::{stamp_path, Stamp};

/// Child file name to last observed stamp.
pub type Snapshot = BTreeMap<String, Stamp>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl From<ChangeKind> for EventKind {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created => EventKind::Created,
            ChangeKind::Modified => EventKind::Modified,
            ChangeKind::Deleted => EventKind::Deleted,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        EventKind::from(*self).fmt(f)
    }
}

/// One changed child between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildChange {
    pub name: String,
    pub kind: ChangeKind,
}

impl ChildChange {
    fn new(name: &str, kind: ChangeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Stamp every regular file directly inside `dir`.
///
/// A missing directory scans as empty. Entries that vanish or cannot be
/// stamped mid-scan are left out of this snapshot and picked up on a later
/// scan.
pub fn scan_dir(dir: &Path, strategy: StampStrategy) -> Result<Snapshot, DetectError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(err) => return Err(io_err(dir, err)),
    };

    let mut snapshot = Snapshot::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        // Follows symlinks so a link to a regular file counts as one.
        if !path.is_file() {
            continue;
        }
        record_entry(
            &mut snapshot,
            entry.file_name().to_string_lossy().to_string(),
            &path,
            strategy,
        );
    }
    Ok(snapshot)
}

/// Stamp `path` into `snapshot` as `name`. Entries that fail to stamp are
/// left out.
fn record_entry(snapshot: &mut Snapshot, name: String, path: &Path, strategy: StampStrategy) {
    match stamp_path(path, strategy) {
        Ok(stamp) => {
            snapshot.insert(name, stamp);
        }
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "skipping unstampable entry");
        }
    }
}

/// Children that changed between `previous` and `current`.
///
/// Created and modified children come first, merged in ascending name order,
/// followed by deleted children in ascending name order.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<ChildChange> {
    let mut changes = Vec::new();
    for (name, stamp) in current {
        match previous.get(name) {
            None => changes.push(ChildChange::new(name, ChangeKind::Created)),
            Some(prev) if prev != stamp => changes.push(ChildChange::new(name, ChangeKind::Modified)),
            Some(_) => {}
        }
    }
    for name in previous.keys() {
        if !current.contains_key(name) {
            changes.push(ChildChange::new(name, ChangeKind::Deleted));
        }
    }
    changes
}
