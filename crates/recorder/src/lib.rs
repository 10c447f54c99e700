//! # Recorder
//!
//! Record-and-replay of processed frames.
//!
//! Responsibilities:
//! - Collect processed frames into a `Take` while a recording is active
//! - Save takes to `.c3d` point-track containers on a dedicated worker
//! - Load takes back into per-(system, trackable type) template frames
//! - Replay them at the recorded rate into a `PlaybackTarget`, looping
//!   and notifying the target so continuity state can be reset
//!
//! ## Example
//!
//! ```ignore
//! let recorder = Arc::new(Recorder::new(config.recorder.clone())?);
//! recorder.start_recording(None)?;
//! // ... RecorderSink feeds frames ...
//! let path = recorder.stop_recording(None)?;
//!
//! let player = Player::new(config.playback.clone(), engine.clone());
//! player.load(&path)?;
//! player.play()?;
//! ```

pub mod container;
pub mod error;
pub mod player;
pub mod player_take;
pub mod recorder;
pub mod sink;
pub mod take;

pub use container::{Container, Parameter};
pub use error::{ContainerError, RecorderError, Result};
pub use player::{Player, Resampler};
pub use player_take::{PlayerTake, TemplateFrame};
pub use recorder::{Recorder, RecordingEvent};
pub use sink::RecorderSink;
pub use take::{tagged, Take, FPS_TOLERANCE};
