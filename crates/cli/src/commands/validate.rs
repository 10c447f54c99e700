//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{RtlsConfig, SystemType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::load_config;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    project: String,
    systems: Vec<SystemType>,
    postprocessor_count: usize,
    sink_count: usize,
    player: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    project: config.project.name.clone(),
                    systems: config.systems.clone(),
                    postprocessor_count: if config.postprocess {
                        config.effective_postprocessors().len()
                    } else {
                        0
                    },
                    sink_count: config.sinks.len(),
                    player: config.player,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &RtlsConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - processed frames are only counted".to_string());
    }

    for system in &config.systems {
        if *system != SystemType::Null {
            warnings.push(format!(
                "System '{system}' has no driver in this build and will be skipped"
            ));
        }
    }

    if config.systems.contains(&SystemType::Null) && config.null_source.count == 0 {
        warnings.push("null_source.count is 0 - the null source emits empty frames".to_string());
    }

    if !config.player && config.playback.take_path.is_some() {
        warnings.push("playback.take_path is set but the player is disabled".to_string());
    }

    if let Some(ref path) = config.playback.take_path {
        if !path.exists() {
            warnings.push(format!("Playback take not found: {}", path.display()));
        }
    }

    for pp in &config.postprocessors {
        if let Some(ref dict) = pp.dictionary_path {
            if !dict.exists() {
                warnings.push(format!(
                    "Postprocessor '{}': dictionary {} not found, ids pass through unchanged",
                    pp.name,
                    dict.display()
                ));
            }
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("OK   Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Project: {}", summary.project);
            println!("  Systems: {:?}", summary.systems);
            println!("  Postprocessors: {}", summary.postprocessor_count);
            println!("  Sinks: {}", summary.sink_count);
            println!("  Player: {}", summary.player);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\nWarnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("FAIL Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = write_config("systems = [\"null\", \"motive\"]\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No sinks")));
        assert!(warnings.iter().any(|w| w.contains("motive")));
        assert_eq!(result.summary.unwrap().postprocessor_count, 4);
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_config(&ValidateArgs {
            config: "/nonexistent/rtls.toml".into(),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_json_output_shape() {
        let file = write_config("systems = [\"null\"]\n[[sinks]]\nname = \"log\"\nsink_type = \"log\"\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["summary"]["sink_count"], 1);
        assert!(json.get("error").is_none());
    }
}
