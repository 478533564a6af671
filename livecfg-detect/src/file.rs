//! Single-file staleness.
//!
//! Status precedence on each check:
//! 1. `Deleted` / `StillDeleted` (path missing)
//! 2. `Stale` (no previous stamp, stamp differs, or path reappeared)
//! 3. `Unchanged`

use std::path::Path;

use livecfg_core::StampStrategy;

use crate::error::DetectError;
use crate::stamp::{stamp_path, Stamp};

/// Result of one staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Unchanged,
    Stale(Stamp),
    /// The path just went missing; report it.
    Deleted,
    /// The path is still missing (or never existed); nothing to report.
    StillDeleted,
}

/// A file is stale iff its current stamp differs from `last`, or `last` is absent.
///
/// Stateless: a missing path always reports [`FileStatus::Deleted`]. Use
/// [`FileProbe`] to suppress repeats.
pub fn is_file_stale(
    path: &Path,
    last: Option<&Stamp>,
    strategy: StampStrategy,
) -> Result<FileStatus, DetectError> {
    match stamp_path(path, strategy) {
        Ok(current) if last == Some(&current) => Ok(FileStatus::Unchanged),
        Ok(current) => Ok(FileStatus::Stale(current)),
        Err(err) if err.is_not_found() => Ok(FileStatus::Deleted),
        Err(err) => Err(err),
    }
}

/// Stateful wrapper around [`is_file_stale`] that reports an absence once.
///
/// After a reported deletion the next appearance of the path is always
/// `Stale`, even if its stamp matches the one seen before it vanished.
#[derive(Debug, Clone)]
pub struct FileProbe {
    strategy: StampStrategy,
    seen: bool,
    absence_reported: bool,
}

impl FileProbe {
    pub fn new(strategy: StampStrategy) -> Self {
        Self {
            strategy,
            seen: false,
            absence_reported: false,
        }
    }

    pub fn strategy(&self) -> StampStrategy {
        self.strategy
    }

    /// Whether the path is currently known to be missing.
    pub fn absence_reported(&self) -> bool {
        self.absence_reported
    }

    pub fn check(&mut self, path: &Path, last: Option<&Stamp>) -> Result<FileStatus, DetectError> {
        let last = if self.absence_reported { None } else { last };
        match is_file_stale(path, last, self.strategy)? {
            FileStatus::Deleted if self.absence_reported || !self.seen => {
                // Never existed, or already reported.
                self.absence_reported = true;
                Ok(FileStatus::StillDeleted)
            }
            FileStatus::Deleted => {
                self.absence_reported = true;
                Ok(FileStatus::Deleted)
            }
            status => {
                self.seen = true;
                self.absence_reported = false;
                Ok(status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn write_at(path: &Path, body: &str, secs: i64) {
        fs::write(path, body).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    #[test]
    fn first_check_is_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yaml");
        write_at(&path, "a", 100);
        let status = is_file_stale(&path, None, StampStrategy::Modified).unwrap();
        assert!(matches!(status, FileStatus::Stale(_)));
    }

    #[test]
    fn same_stamp_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yaml");
        write_at(&path, "a", 100);
        let stamp = stamp_path(&path, StampStrategy::Modified).unwrap();
        let status = is_file_stale(&path, Some(&stamp), StampStrategy::Modified).unwrap();
        assert_eq!(status, FileStatus::Unchanged);
    }

    #[test]
    fn older_stamp_still_counts_as_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yaml");
        write_at(&path, "a", 200);
        let stamp = stamp_path(&path, StampStrategy::Modified).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(100, 0)).unwrap();
        let status = is_file_stale(&path, Some(&stamp), StampStrategy::Modified).unwrap();
        assert!(matches!(status, FileStatus::Stale(_)));
    }

    #[test]
    fn probe_reports_deletion_once_then_reappearance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yaml");
        write_at(&path, "a", 100);
        let mut probe = FileProbe::new(StampStrategy::Modified);

        let FileStatus::Stale(stamp) = probe.check(&path, None).unwrap() else {
            panic!("expected stale on first check");
        };

        fs::remove_file(&path).unwrap();
        assert_eq!(probe.check(&path, Some(&stamp)).unwrap(), FileStatus::Deleted);
        assert_eq!(
            probe.check(&path, Some(&stamp)).unwrap(),
            FileStatus::StillDeleted
        );
        assert_eq!(
            probe.check(&path, Some(&stamp)).unwrap(),
            FileStatus::StillDeleted
        );

        // Same bytes, same mtime: still reported because it came back.
        write_at(&path, "a", 100);
        assert_eq!(
            probe.check(&path, Some(&stamp)).unwrap(),
            FileStatus::Stale(stamp.clone())
        );
        assert!(!probe.absence_reported());
    }

    #[test]
    fn probe_is_silent_for_a_path_that_never_existed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("later.yaml");
        let mut probe = FileProbe::new(StampStrategy::Modified);
        assert_eq!(probe.check(&path, None).unwrap(), FileStatus::StillDeleted);
        assert_eq!(probe.check(&path, None).unwrap(), FileStatus::StillDeleted);

        write_at(&path, "a", 100);
        assert!(matches!(
            probe.check(&path, None).unwrap(),
            FileStatus::Stale(_)
        ));
    }
}
