//! Error types for CLI operations.

use std::path::PathBuf;

use config_loader::ConfigManager;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parsing or validation error
    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// A take could not be opened
    #[error("Cannot open take {}: {source}", path.display())]
    TakeLoad {
        path: PathBuf,
        #[source]
        source: recorder::RecorderError,
    },

    /// Pipeline setup or execution error
    #[error("Pipeline execution failed: {message}")]
    PipelineExecution { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn take_load(path: impl Into<PathBuf>, source: recorder::RecorderError) -> Self {
        Self::TakeLoad {
            path: path.into(),
            source,
        }
    }

    pub fn pipeline_execution(message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Load and validate a configuration file.
///
/// Each command loads its configuration once through a [`ConfigManager`]
/// and passes the result down by reference.
pub fn load_config(path: &std::path::Path) -> Result<contracts::RtlsConfig> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    let mut manager = ConfigManager::new();
    manager
        .load(path)
        .map_err(|e| CliError::config_invalid(e.to_string()))?;
    Ok(manager.into_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(std::path::Path::new("/nonexistent/rtls.toml")).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_config_invalid_content() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "systems = [\"bogus\"]").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, CliError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_load_config_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"systems":["null"],"postprocess":false}}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert!(!config.postprocess);
    }

    #[test]
    fn test_load_config_ok() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "systems = [\"null\"]").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.systems, vec![contracts::SystemType::Null]);
    }
}
