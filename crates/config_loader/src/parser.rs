//! Config parsing
//!
//! TOML (primary) and JSON formats.

use contracts::{ContractError, RtlsConfig};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML config
pub fn parse_toml(content: &str) -> Result<RtlsConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        format: "TOML",
        message: e.to_string(),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON config
pub fn parse_json(content: &str) -> Result<RtlsConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        format: "JSON",
        message: e.to_string(),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<RtlsConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{FilterStageConfig, MappingClass, StageKind, SystemType, TrackableType};

    #[test]
    fn test_parse_toml_full() {
        let content = r#"
systems = ["null", "motive"]
postprocess = true

[project]
name = "stage-left"

[engine]
stop_gap_ms = 150

[[postprocessors]]
name = "markers"
system = "motive"
trackable_type = "sample"
stages = ["map_ids", "continuity", "remove_unidentifiable", "filters"]

[postprocessors.continuity]
radius = 0.25
mapping_from = "temporary"
assign_cuid_to_unmatched = true

[[postprocessors.filters.stages]]
kind = "age_gate"
min_samples = 2

[[postprocessors.filters.stages]]
kind = "easing"
factor = 0.3

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.systems, vec![SystemType::Null, SystemType::Motive]);
        assert_eq!(config.project.name, "stage-left");
        assert_eq!(config.engine.stop_gap_ms, 150);
        assert_eq!(config.engine.poll_interval_ms, 16);

        let pp = &config.postprocessors[0];
        assert_eq!(pp.trackable_type, TrackableType::Sample);
        assert_eq!(pp.stages[2], StageKind::RemoveUnidentifiable);
        assert_eq!(pp.continuity.mapping_from, MappingClass::Temporary);
        assert_eq!(pp.continuity.permanent_key_types, "id,name");
        assert!(pp.continuity.assign_cuid_to_unmatched);
        assert_eq!(
            pp.filters.stages[0],
            FilterStageConfig::AgeGate {
                min_samples: 2,
                max_missing: 10
            }
        );
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.systems, vec![SystemType::Null]);
        assert!(config.postprocess);
        assert!(config.player);
        assert_eq!(config.recorder.take_prefix, "take");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "systems": ["null"],
            "postprocess": false,
            "player": true,
            "sinks": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert!(!result.unwrap().postprocess);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_system_rejected() {
        let result = parse_toml(r#"systems = ["vicon"]"#);
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
