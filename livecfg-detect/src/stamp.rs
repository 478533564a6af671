//! Change stamps: cheap markers of content state.

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use livecfg_core::StampStrategy;

use crate::error::{io_err, DetectError};

/// Comparable marker of a file's state. Only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// Modification time and length from metadata.
    Modified { at: SystemTime, len: u64 },
    /// Hex SHA-256 of the content.
    Fingerprint(String),
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::Modified { at, len } => {
                let since = at.duration_since(UNIX_EPOCH).unwrap_or_default();
                write!(f, "{}.{:09}s/{}b", since.as_secs(), since.subsec_nanos(), len)
            }
            Stamp::Fingerprint(hex) => write!(f, "sha256:{}", hex.get(..12).unwrap_or(hex)),
        }
    }
}

/// Read the current stamp of `path` using `strategy`.
///
/// A missing path surfaces as [`DetectError::Io`] with `NotFound`; check it
/// with [`DetectError::is_not_found`].
pub fn stamp_path(path: &Path, strategy: StampStrategy) -> Result<Stamp, DetectError> {
    match strategy {
        StampStrategy::Modified => {
            let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
            let at = meta.modified().map_err(|e| io_err(path, e))?;
            Ok(Stamp::Modified {
                at,
                len: meta.len(),
            })
        }
        StampStrategy::Content => fingerprint(path).map(Stamp::Fingerprint),
    }
}

fn fingerprint(path: &Path) -> Result<String, DetectError> {
    let content = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    #[test]
    fn mtime_stamp_changes_with_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.conf");
        fs::write(&path, "x=1").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_000, 0)).unwrap();
        let first = stamp_path(&path, StampStrategy::Modified).unwrap();

        set_file_mtime(&path, FileTime::from_unix_time(2_000, 0)).unwrap();
        let second = stamp_path(&path, StampStrategy::Modified).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            second,
            Stamp::Modified {
                at: UNIX_EPOCH + Duration::from_secs(2_000),
                len: 3
            }
        );
    }

    #[test]
    fn fingerprint_ignores_mtime_and_tracks_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.conf");
        fs::write(&path, "x=1").unwrap();
        let first = stamp_path(&path, StampStrategy::Content).unwrap();

        set_file_mtime(&path, FileTime::from_unix_time(5_000, 0)).unwrap();
        assert_eq!(first, stamp_path(&path, StampStrategy::Content).unwrap());

        fs::write(&path, "x=2").unwrap();
        assert_ne!(first, stamp_path(&path, StampStrategy::Content).unwrap());
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = stamp_path(&dir.path().join("nope"), StampStrategy::Modified).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn display_is_compact() {
        let stamp = Stamp::Modified {
            at: UNIX_EPOCH + Duration::from_secs(12),
            len: 4,
        };
        assert_eq!(stamp.to_string(), "12.000000000s/4b");
        let fp = Stamp::Fingerprint("abcdef0123456789".into());
        assert_eq!(fp.to_string(), "sha256:abcdef012345");
    }

    #[test]
    fn display_tolerates_short_and_non_ascii_fingerprints() {
        assert_eq!(Stamp::Fingerprint("abc".into()).to_string(), "sha256:abc");
        // Byte 12 falls inside a multi-byte char.
        let odd = Stamp::Fingerprint("aéééééé".into());
        assert_eq!(odd.to_string(), "sha256:aéééééé");
    }
}
