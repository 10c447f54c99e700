//! Loads an [`RtlsConfig`] from a `.toml` or `.json` file (or string) and
//! checks it before anything is started. Sources, postprocessor chains and
//! sinks all read their settings from the result.
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("rtls.toml")).unwrap();
//! println!("systems: {:?}", config.systems);
//! ```

mod manager;
mod parser;
mod validator;

pub use contracts::RtlsConfig;
pub use manager::ConfigManager;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Stateless entry point; see [`ConfigManager`] for the process-wide copy
pub struct ConfigLoader;

impl ConfigLoader {
    /// Format is picked from the extension. Fails on unreadable files,
    /// unknown extensions, parse errors and validation errors.
    pub fn load_from_path(path: &Path) -> Result<RtlsConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<RtlsConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Validate an already constructed configuration
    pub fn validate(config: &RtlsConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize RtlsConfig to TOML string
    pub fn to_toml(config: &RtlsConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize RtlsConfig to JSON string
    pub fn to_json(config: &RtlsConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemType;

    const MINIMAL_TOML: &str = r#"
systems = ["null"]

[null_source]
fps = 60.0
count = 8

[[postprocessors]]
name = "null-markers"
system = "null"
trackable_type = "sample"

[[postprocessors.filters.stages]]
kind = "axis_remap"
axes = ["x", "-z", "y"]

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.systems, vec![SystemType::Null]);
        assert_eq!(config.null_source.count, 8);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.systems, config2.systems);
        assert_eq!(config.postprocessors.len(), config2.postprocessors.len());
        assert_eq!(
            config.postprocessors[0].filters.stages,
            config2.postprocessors[0].filters.stages
        );
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.null_source.fps, config2.null_source.fps);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
systems = ["null"]

[[postprocessors]]
name = "a"
system = "motive"
trackable_type = "sample"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not enabled"));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = ConfigLoader::load_from_path(Path::new("rtls.yaml"));
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }
}
