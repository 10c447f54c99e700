//! Recorder / player error types

use std::path::PathBuf;

use contracts::{ContractError, SystemType};
use thiserror::Error;

/// Errors reading or writing a take container
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a take container (bad magic)")]
    BadMagic,

    #[error("unsupported container version {version}")]
    UnsupportedVersion { version: u16 },

    #[error("container truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("invalid utf-8 in {what}")]
    InvalidText { what: &'static str },

    #[error("container inconsistent: {message}")]
    Inconsistent { message: String },
}

impl ContainerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }
}

/// Recorder and player errors
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recorder is disabled")]
    Disabled,

    #[error("not recording")]
    NotRecording,

    #[error("already recording to '{path}'")]
    AlreadyRecording { path: PathBuf },

    #[error("invalid frame rate {fps}")]
    InvalidFrameRate { fps: f32 },

    #[error("system {system} runs at {fps} fps but the take is locked to {take_fps} fps")]
    FrameRateMismatch {
        system: SystemType,
        fps: f32,
        take_fps: f32,
    },

    #[error("cannot save empty take")]
    EmptyTake,

    #[error("cannot save take without a frame rate")]
    InvalidTake,

    #[error("'{path}' is not a .c3d take")]
    BadExtension { path: PathBuf },

    #[error("take '{path}' does not exist")]
    MissingTake { path: PathBuf },

    #[error("point '{label}' has an unusable description: {message}")]
    BadDescription { label: String, message: String },

    #[error("no take loaded")]
    NothingLoaded,

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl RecorderError {
    pub fn bad_description(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadDescription {
            label: label.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
