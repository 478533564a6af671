//! Polling engine: tracked sources, event bus and lifecycle.
//!
//! ```no_run
//! # async fn demo() -> Result<(), livecfg_engine::EngineError> {
//! use livecfg_engine::{decoders, EngineBuilder, EventFilter};
//! use livecfg_core::SourceDeclaration;
//!
//! let engine = EngineBuilder::<serde_json::Value>::new()
//!     .decoder("yaml", decoders::yaml())
//!     .source(SourceDeclaration::file("app", "/etc/app.yaml", "yaml"))
//!     .build()?;
//! engine.bus().subscribe(EventFilter::for_source("app"), |event| {
//!     tracing::info!(kind = %event.kind, "app config changed");
//!     Ok(())
//! });
//! engine.start()?;
//! let current = engine.get("app")?;
//! engine.stop().await;
//! # let _ = current;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod decoder;
mod engine;
mod error;
pub mod source;
pub mod status;

pub use bus::{Delivery, EventBus, EventFilter, SourcePattern, SubscriptionId};
pub use decoder::{decoders, Decoder, DecoderTable};
pub use engine::{Engine, EngineBuilder, EngineState};
pub use error::{EngineError, SubscriberError};
pub use source::{PollOutcome, SourceValue, TrackedSource};
pub use status::SourceStatus;

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Same as [`init_tracing`] but emits one JSON object per line.
pub fn init_json_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
