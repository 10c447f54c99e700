//! Ingestion error types

use contracts::{ContractError, SystemType};
use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Source for this system is not available in this build or host
    #[error("source {system} unavailable: {message}")]
    SourceUnavailable { system: SystemType, message: String },

    /// A source for this system is already registered
    #[error("source for system {system} already registered")]
    AlreadyRegistered { system: SystemType },

    /// No source registered for this system
    #[error("no source registered for system {system}")]
    NotRegistered { system: SystemType },

    /// Source failed to start
    #[error("source '{name}' failed to start: {source}")]
    StartFailed {
        name: String,
        #[source]
        source: ContractError,
    },
}

impl IngestionError {
    pub fn unavailable(system: SystemType, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            system,
            message: message.into(),
        }
    }

    pub fn start_failed(name: impl Into<String>, source: ContractError) -> Self {
        Self::StartFailed {
            name: name.into(),
            source,
        }
    }
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;
