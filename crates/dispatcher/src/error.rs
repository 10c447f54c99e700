//! Dispatcher error types

use contracts::{SystemType, TrackableType};
use thiserror::Error;

/// Dispatcher setup errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Postprocessor could not be started
    #[error("postprocessor error: {0}")]
    Postprocess(#[from] postprocess::PostprocessError),

    /// Engine thread could not be started
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Reasons a single frame was not dispatched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Source system not enabled in this deployment
    #[error("system {system} is not enabled")]
    SystemDisabled { system: SystemType },

    /// Invalid system or trackable type
    #[error("invalid route {system}/{trackable_type}")]
    InvalidRoute {
        system: SystemType,
        trackable_type: TrackableType,
    },

    /// No postprocessor configured for this stream
    #[error("no postprocessor for {system}/{trackable_type}")]
    UnknownRoute {
        system: SystemType,
        trackable_type: TrackableType,
    },

    /// Live frame dropped while a take of the same system is playing
    #[error("live frame from {system} suppressed by playback")]
    Suppressed { system: SystemType },

    /// Postprocessor queue full, frame dropped
    #[error("postprocessor for {system}/{trackable_type} is backlogged")]
    Backlogged {
        system: SystemType,
        trackable_type: TrackableType,
    },

    /// Engine is shutting down
    #[error("engine shut down")]
    ShutDown,
}
