//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the RTLS server:
//! the frame data model, identity keys, source/sink/playback traits, the
//! reusable queue worker and the configuration model.
//! Business crates depend only on this crate for shared types.
//!
//! ## Time Model
//! - `Frame::timestamp_ms` is wall clock milliseconds since the Unix epoch
//! - `Frame::frame_id` increases monotonically per source system
//! - latency and liveness use `Instant` and never leave the process

mod config;
mod envelope;
mod error;
mod playback;
mod sink;
mod trackable;
mod trackable_key;
mod tracking_source;
mod worker;

pub use config::*;
pub use envelope::*;
pub use error::*;
pub use playback::PlaybackTarget;
pub use sink::*;
pub use trackable::*;
pub use trackable_key::{derive_key, KeyType, TrackableKey};
pub use tracking_source::{FrameCallback, SourceFrame, TrackingSource};
pub use worker::{panic_message, Worker, DEFAULT_WORKER_CAPACITY};
