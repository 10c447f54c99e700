//! # Ingestion
//!
//! Tracking source management.
//!
//! Responsibilities:
//! - Register tracking sources, at most one per system
//! - Start/stop all sources as a unit and report connection state
//! - Count received frames per registry (`IngestionMetrics`)
//! - Synthetic `NullSource` and deterministic `ScriptedSource` for tests
//! - Build sources from `RtlsConfig`; systems without a driver fail cleanly
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::build_registry;
//!
//! let registry = build_registry(&config);
//! registry.start_all(|system| engine.source_callback(system));
//! // ...
//! registry.stop_all();
//! ```
//!
//! ## Mock Testing
//!
//! ```ignore
//! use ingestion::ScriptedSource;
//!
//! let source = Arc::new(ScriptedSource::manual("motive", SystemType::Motive));
//! registry.register(source.clone())?;
//! registry.start_all(make_callback);
//! source.emit(SourceFrame::samples(frame));
//! ```

mod error;
mod factory;
mod metrics;
mod mock;
mod null_source;
mod registry;

// Re-exports
pub use contracts::{SourceFrame, TrackingSource};
pub use error::{IngestionError, Result};
pub use factory::{build_registry, create_source};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use mock::{ScriptedSource, ScriptedSourceConfig};
pub use null_source::{NullGenerator, NullSource};
pub use registry::SourceRegistry;
