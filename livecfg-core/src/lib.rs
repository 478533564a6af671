//! livecfg core library: source declarations, events, settings, errors.
//!
//! Public API surface:
//! - [`types`]: identifiers, declarations and change events
//! - [`settings`]: engine-wide defaults ([`EngineSettings`])
//! - [`manifest`]: YAML manifest load / resolve
//! - [`error`]: [`ConfigError`] and [`DecodeError`]

pub mod error;
pub mod manifest;
pub mod settings;
pub mod types;

pub use error::{ConfigError, DecodeError};
pub use manifest::Manifest;
pub use settings::{EngineSettings, StampStrategy};
pub use types::{
    ChangeEvent, DecoderId, EventKind, ResolvedDeclaration, SourceDeclaration, SourceId,
    SourceKind,
};
