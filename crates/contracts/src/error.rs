//! Errors shared across crate boundaries.
//!
//! Crates with richer failure modes (recorder, postprocess, ingestion) wrap
//! this in their own error enums.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    /// Config text could not be decoded as `format`
    #[error("could not read {format} config: {message}")]
    ConfigParse {
        format: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Config decoded but a field holds an unusable value
    #[error("invalid config value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// A tracking source failed while starting, running or stopping
    #[error("source '{source_name}': {message}")]
    Source { source_name: String, message: String },

    #[error("sink '{sink_name}' rejected frame: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink could not open its socket / file
    #[error("sink '{sink_name}' could not connect: {message}")]
    SinkConnection { sink_name: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ContractError {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            format: "unknown",
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the configuration rather than the runtime
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse { .. } | Self::ConfigValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_classified() {
        assert!(ContractError::config_validation("fps", "must be positive").is_config());
        assert!(ContractError::config_parse("bad").is_config());
        assert!(!ContractError::sink_write("udp", "closed").is_config());
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = ContractError::config_validation("null_source.fps", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid config value for 'null_source.fps': must be positive"
        );
    }
}
