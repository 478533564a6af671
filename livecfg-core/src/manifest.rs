//! YAML manifest listing the sources to track.
//!
//! # Layout
//!
//! ```text
//! default_poll_interval_ms: 1000   # optional, defaults to 5000
//! stamp: modified                  # optional, `modified` or `content`
//! sources:
//!   - id: app
//!     path: conf/app.yaml          # relative to the manifest's directory
//!     decoder: yaml
//!   - id: fragments
//!     path: conf/fragments.d
//!     decoder: yaml
//!     kind: directory
//!     poll_interval_ms: 250
//! ```
//!
//! # API pattern
//!
//! - `load_at(path)` reads and parses a manifest file
//! - `Manifest::resolve(base_dir)` turns it into validated declarations

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::settings::EngineSettings;
use crate::types::{ResolvedDeclaration, SourceDeclaration};

/// Root of a manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Manifest {
    #[serde(flatten)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub sources: Vec<SourceDeclaration>,
}

impl Manifest {
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resolve every declaration against this manifest's settings.
    ///
    /// Returns declarations in manifest order. Rejects duplicate ids.
    pub fn resolve(&self, base_dir: &Path) -> Result<Vec<ResolvedDeclaration>, ConfigError> {
        resolve_all(&self.sources, &self.settings, base_dir)
    }
}

/// Resolve a list of declarations, rejecting duplicate ids.
pub fn resolve_all(
    declarations: &[SourceDeclaration],
    settings: &EngineSettings,
    base_dir: &Path,
) -> Result<Vec<ResolvedDeclaration>, ConfigError> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(declarations.len());
    for decl in declarations {
        if !seen.insert(decl.id.clone()) {
            return Err(ConfigError::DuplicateSource {
                source_id: decl.id.0.clone(),
            });
        }
        resolved.push(decl.resolve(settings, base_dir)?);
    }
    Ok(resolved)
}

/// Load a manifest from `path`.
///
/// Returns `ConfigError::ManifestNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Manifest, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ManifestNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    Manifest::from_yaml_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Directory relative manifest paths are resolved against.
pub fn base_dir_of(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::settings::StampStrategy;
    use crate::types::SourceKind;

    const SAMPLE: &str = r#"
default_poll_interval_ms: 1000
stamp: content
sources:
  - id: app
    path: conf/app.yaml
    decoder: yaml
  - id: fragments
    path: /etc/fragments.d
    decoder: json
    kind: directory
    poll_interval_ms: 250
"#;

    #[test]
    fn parses_settings_and_sources() {
        let manifest = Manifest::from_yaml_str(SAMPLE).expect("parse");
        assert_eq!(
            manifest.settings().default_poll_interval,
            Duration::from_secs(1)
        );
        assert_eq!(manifest.settings().stamp, StampStrategy::Content);
        assert_eq!(manifest.sources.len(), 2);
        assert_eq!(manifest.sources[1].kind, SourceKind::Directory);
    }

    #[test]
    fn resolve_applies_defaults_and_base_dir() {
        let manifest = Manifest::from_yaml_str(SAMPLE).expect("parse");
        let resolved = manifest.resolve(Path::new("/srv")).expect("resolve");
        assert_eq!(resolved[0].path(), Path::new("/srv/conf/app.yaml"));
        assert_eq!(resolved[0].poll_interval(), Duration::from_secs(1));
        assert_eq!(resolved[1].path(), Path::new("/etc/fragments.d"));
        assert_eq!(resolved[1].poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn resolve_rejects_duplicate_ids() {
        let manifest = Manifest::from_yaml_str(
            "sources:\n  - {id: a, path: x, decoder: d}\n  - {id: a, path: y, decoder: d}\n",
        )
        .expect("parse");
        let err = manifest.resolve(Path::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSource { .. }));
    }

    #[test]
    fn empty_document_is_an_empty_manifest() {
        let manifest = Manifest::from_yaml_str("{}").expect("parse");
        assert!(manifest.sources.is_empty());
        assert_eq!(manifest.settings, EngineSettings::default());
    }

    #[test]
    fn base_dir_of_bare_filename_is_cwd() {
        assert_eq!(base_dir_of(Path::new("livecfg.yaml")), PathBuf::from("."));
        assert_eq!(
            base_dir_of(Path::new("/etc/svc/livecfg.yaml")),
            PathBuf::from("/etc/svc")
        );
    }

    #[test]
    fn bare_manifest_name_still_resolves_absolute_paths() {
        let manifest = Manifest::from_yaml_str(SAMPLE).expect("parse");
        let resolved = manifest
            .resolve(&base_dir_of(Path::new("livecfg.yaml")))
            .expect("resolve");
        assert!(resolved[0].path().is_absolute());
        assert!(resolved[0].path().ends_with("conf/app.yaml"));
    }
}
