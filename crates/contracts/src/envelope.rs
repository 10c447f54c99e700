//! FrameEnvelope - a frame plus its routing metadata
//!
//! Envelopes are what the fusion engine hands to postprocessors and what
//! output consumers receive on the new-frame event.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::{Frame, FrameContext, SystemType, TrackableType};

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    #[default]
    Live,
    Playback,
}

/// Frame with routing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEnvelope {
    pub system: SystemType,
    pub trackable_type: TrackableType,
    /// Frame rate of the producing source at arrival
    pub fps: f32,
    pub origin: FrameOrigin,
    /// Arrival time at the fusion engine, used for latency
    #[serde(skip, default = "Instant::now")]
    pub received_at: Instant,
    pub frame: Frame,
}

impl FrameEnvelope {
    pub fn new(system: SystemType, trackable_type: TrackableType, frame: Frame) -> Self {
        Self {
            system,
            trackable_type,
            fps: 0.0,
            origin: FrameOrigin::Live,
            received_at: Instant::now(),
            frame,
        }
    }

    pub fn with_origin(mut self, origin: FrameOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = fps;
        self
    }

    pub fn context(&self) -> FrameContext {
        FrameContext::new(self.system, self.trackable_type)
    }

    pub fn is_playback(&self) -> bool {
        self.origin == FrameOrigin::Playback
    }
}

/// Delivery callback for processed envelopes
pub type FrameHandler = Arc<dyn Fn(FrameEnvelope) + Send + Sync>;

/// One arrival-to-dispatch latency measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub system: SystemType,
    /// This measurement
    pub latency_ms: f64,
    /// Exponential moving average after this measurement
    pub smoothed_ms: f64,
}
