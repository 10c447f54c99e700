//! # Postprocess
//!
//! Per-stream cleanup of tracking frames.
//!
//! Responsibilities:
//! - ID dictionary mapping of raw marker ids
//! - Removal of unidentifiable trackables
//! - Hungarian identity continuity between consecutive frames
//! - Per-key filter chains (gating, Kalman smoothing, easing, rate limits)
//! - One FIFO worker thread per (system, trackable type) stream
//!
//! ## Example
//!
//! ```ignore
//! use postprocess::Postprocessor;
//! use contracts::{PostprocessorConfig, SystemType, TrackableType};
//!
//! let config = PostprocessorConfig::default_for(SystemType::Null, TrackableType::Sample);
//! let pp = Postprocessor::new(&config)?;
//!
//! pp.process_and_send(envelope, Arc::new(|processed| {
//!     // deliver to sinks
//! }));
//! ```

mod continuity;
mod error;
pub mod filter;
mod hungarian;
mod id_dictionary;
mod postprocessor;

pub use continuity::{ContinuityReport, ContinuityResolver};
pub use error::{PostprocessError, Result};
pub use filter::{Filter, FilterGroup, FilterStage};
pub use hungarian::{minimize, solve as match_positions};
pub use id_dictionary::IdDictionary;
pub use postprocessor::{
    remove_unidentifiable, FramePipeline, Postprocessor, PostprocessorMetrics,
    PostprocessorSnapshot,
};
