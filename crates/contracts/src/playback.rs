//! PlaybackTarget trait - how the player talks to the dispatch path

use crate::{Frame, SystemType, TrackableType};

/// Receiver of replayed frames and playback lifecycle notifications.
///
/// Implemented by the fusion engine so that replayed frames follow the
/// same path as live ones while live data from the replayed system is
/// suppressed.
pub trait PlaybackTarget: Send + Sync {
    /// Playback of `system` began; live frames from it must be suppressed
    fn playback_started(&self, system: SystemType);

    /// One reconstructed playback frame
    fn playback_frame(&self, system: SystemType, trackable_type: TrackableType, fps: f32, frame: Frame);

    /// The take wrapped around; continuity state for this stream is stale
    fn playback_looped(&self, system: SystemType, trackable_type: TrackableType);

    /// Playback of `system` ended; live frames flow again
    fn playback_stopped(&self, system: SystemType);
}
