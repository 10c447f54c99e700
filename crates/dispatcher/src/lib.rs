//! # Dispatcher
//!
//! Fusion engine and output fan-out.
//!
//! Responsibilities:
//! - Accept source frames, tag and number them, route them to postprocessors
//! - Track per-source frame rate, liveness and dispatch latency
//! - Suppress live data of a system while a take of it is playing
//! - Publish processed frames on the new-frame event bus
//! - Fan out to sinks, isolating slow sinks from the main path
//!
//! ## Example
//!
//! ```ignore
//! let engine = FusionEngine::new(&config)?;
//! let frames = engine.subscribe();
//! registry.start_all(|system| engine.source_callback(system));
//! let dispatcher = create_dispatcher(config.sinks.clone(), frames).await?;
//! dispatcher.spawn();
//! ```

pub mod bus;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use bus::{EventBus, DEFAULT_BUS_CAPACITY};
pub use contracts::{DataSink, FrameEnvelope};
pub use dispatcher::{
    create_dispatcher, create_sink_handle, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use engine::{FusionEngine, SourceStatus};
pub use error::{DispatchError, DispatcherError};
pub use handle::{RouteFilter, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FramePacket, LogSink, NetworkSink};
