//! # livecfg-detect
//!
//! Change detection for tracked sources.
//!
//! - [`is_file_stale`] / [`FileProbe`] decide whether a single file changed
//!   since the last stamp observed for it.
//! - [`scan_dir`] + [`diff_snapshots`] compute CREATED / MODIFIED / DELETED
//!   children of a directory between two polls.
//!
//! Nothing here holds values or publishes events; callers own that state.

pub mod dir;
pub mod error;
pub mod file;
pub mod stamp;

pub use dir::{diff_snapshots, scan_dir, ChangeKind, ChildChange, Snapshot};
pub use error::DetectError;
pub use file::{is_file_stale, FileProbe, FileStatus};
pub use stamp::{stamp_path, Stamp};
