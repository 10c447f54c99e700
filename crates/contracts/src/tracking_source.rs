//! TrackingSource trait - tracking system adapter abstraction
//!
//! Each tracking system (synthetic, OpenVR, Motive, ...) implements this
//! trait. Sources push raw frames through a callback, matching the way
//! vendor SDKs deliver data.

use std::sync::Arc;

use crate::{ContractError, Frame, SystemType, TrackableType};

/// Raw frame emitted by a source, before the fusion engine stamps it
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub trackable_type: TrackableType,
    /// Source-reported frame rate, if known
    pub fps: Option<f32>,
    pub frame: Frame,
}

impl SourceFrame {
    pub fn samples(frame: Frame) -> Self {
        Self {
            trackable_type: TrackableType::Sample,
            fps: None,
            frame,
        }
    }

    pub fn observers(frame: Frame) -> Self {
        Self {
            trackable_type: TrackableType::Observer,
            fps: None,
            frame,
        }
    }

    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = Some(fps);
        self
    }
}

/// New-data callback
pub type FrameCallback = Arc<dyn Fn(SourceFrame) + Send + Sync>;

/// Tracking source trait
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn TrackingSource> = make_source();
/// source.start(Arc::new(|frame| {
///     println!("{} trackables", frame.frame.trackables.len());
/// }))?;
/// source.stop();
/// ```
pub trait TrackingSource: Send + Sync {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Tracking system this source belongs to
    fn system_type(&self) -> SystemType;

    /// Start producing frames into `callback`.
    ///
    /// Calling `start` on a running source is a no-op.
    fn start(&self, callback: FrameCallback) -> Result<(), ContractError>;

    /// Stop producing frames and release the producer thread
    fn stop(&self);

    /// True while the source is connected and producing
    fn is_connected(&self) -> bool;
}
