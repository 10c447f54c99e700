//! Postprocess error types

use contracts::ContractError;
use thiserror::Error;

/// Postprocess errors
#[derive(Debug, Error)]
pub enum PostprocessError {
    /// ID dictionary could not be loaded
    #[error("id dictionary '{path}' unusable: {message}")]
    Dictionary { path: String, message: String },

    /// Worker thread could not be spawned
    #[error("postprocessor '{name}' worker error: {source}")]
    Worker {
        name: String,
        #[source]
        source: ContractError,
    },
}

impl PostprocessError {
    pub fn dictionary(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dictionary {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn worker(name: impl Into<String>, source: ContractError) -> Self {
        Self::Worker {
            name: name.into(),
            source,
        }
    }
}

/// Result type for postprocess operations
pub type Result<T> = std::result::Result<T, PostprocessError>;
