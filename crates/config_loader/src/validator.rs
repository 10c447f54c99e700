//! Config validation
//!
//! Field-level rules come from the `validator` derives on the config
//! structs. Cross-field rules live here:
//! - systems are unique and real
//! - postprocessor names and (system, trackable type) streams are unique
//! - postprocessors only target enabled systems
//! - every stage except `remove_unidentifiable` appears at most once
//! - continuity key type lists parse and do not overlap
//! - filter stage parameters are in range
//! - sink names are unique, network sinks name a target address

use std::collections::HashSet;

use contracts::{
    parse_axis, ContractError, FilterStageConfig, KeyType, PostprocessorConfig, RtlsConfig,
    SinkType, StageKind, SystemType, TrackableType,
};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate an RtlsConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &RtlsConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_systems(config)?;
    validate_postprocessors(config)?;
    validate_sinks(config)?;
    Ok(())
}

/// Run derive-based field validation and report the first failing path
fn validate_fields(config: &RtlsConfig) -> Result<(), ContractError> {
    let Err(errors) = config.validate() else {
        return Ok(());
    };
    let mut flat = Vec::new();
    flatten_errors("", &errors, &mut flat);
    flat.sort();
    let (field, message) = flat
        .into_iter()
        .next()
        .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
    Err(ContractError::config_validation(field, message))
}

fn flatten_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", error.code));
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    flatten_errors(&format!("{path}[{idx}]"), inner, out);
                }
            }
        }
    }
}

fn validate_systems(config: &RtlsConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, system) in config.systems.iter().enumerate() {
        if *system == SystemType::Invalid {
            return Err(ContractError::config_validation(
                format!("systems[{idx}]"),
                "'invalid' is not a tracking system",
            ));
        }
        if !seen.insert(system) {
            return Err(ContractError::config_validation(
                format!("systems[{idx}]"),
                format!("duplicate system '{system}'"),
            ));
        }
    }
    Ok(())
}

fn validate_postprocessors(config: &RtlsConfig) -> Result<(), ContractError> {
    let mut names = HashSet::new();
    let mut streams = HashSet::new();

    for (idx, pp) in config.postprocessors.iter().enumerate() {
        let field = format!("postprocessors[{}]", pp.name);

        if !names.insert(pp.name.as_str()) {
            return Err(ContractError::config_validation(
                field,
                "duplicate postprocessor name",
            ));
        }
        if pp.trackable_type == TrackableType::Invalid {
            return Err(ContractError::config_validation(
                format!("{field}.trackable_type"),
                "trackable_type must be 'sample' or 'observer'",
            ));
        }
        if !config.is_enabled(pp.system) {
            return Err(ContractError::config_validation(
                format!("{field}.system"),
                format!("system '{}' is not enabled", pp.system),
            ));
        }
        if !streams.insert((pp.system, pp.trackable_type)) {
            return Err(ContractError::config_validation(
                format!("postprocessors[{idx}]"),
                format!(
                    "stream {}/{} already has a postprocessor",
                    pp.system, pp.trackable_type
                ),
            ));
        }

        validate_stages(&field, pp)?;
        validate_key_types(&field, pp)?;
        for (stage_idx, stage) in pp.filters.stages.iter().enumerate() {
            validate_filter_stage(&format!("{field}.filters.stages[{stage_idx}]"), stage)?;
        }
    }
    Ok(())
}

fn validate_stages(field: &str, pp: &PostprocessorConfig) -> Result<(), ContractError> {
    for kind in [StageKind::MapIds, StageKind::Continuity, StageKind::Filters] {
        let count = pp.stages.iter().filter(|s| **s == kind).count();
        if count > 1 {
            return Err(ContractError::config_validation(
                format!("{field}.stages"),
                format!("stage {kind:?} listed {count} times"),
            ));
        }
    }
    Ok(())
}

fn validate_key_types(field: &str, pp: &PostprocessorConfig) -> Result<(), ContractError> {
    let temporary = KeyType::parse_list(&pp.continuity.temporary_key_types);
    let permanent = KeyType::parse_list(&pp.continuity.permanent_key_types);

    if temporary.contains(&KeyType::None) || permanent.contains(&KeyType::None) {
        return Err(ContractError::config_validation(
            format!("{field}.continuity"),
            "'none' cannot be a temporary or permanent key type",
        ));
    }
    if let Some(shared) = temporary.iter().find(|kt| permanent.contains(kt)) {
        return Err(ContractError::config_validation(
            format!("{field}.continuity"),
            format!("key type '{shared}' is both temporary and permanent"),
        ));
    }
    Ok(())
}

fn validate_filter_stage(field: &str, stage: &FilterStageConfig) -> Result<(), ContractError> {
    let problem = match stage {
        FilterStageConfig::AgeGate { min_samples, .. } if *min_samples == 0 => {
            Some("min_samples must be >= 1".to_string())
        }
        FilterStageConfig::AxisRemap { axes, scale } => {
            let parsed: Option<Vec<_>> = axes.iter().map(|a| parse_axis(a)).collect();
            match parsed {
                None => Some(format!("axes {axes:?} must be x, y or z with optional sign")),
                Some(parsed) => {
                    let distinct: HashSet<_> = parsed.iter().map(|(i, _)| *i).collect();
                    if distinct.len() != 3 {
                        Some(format!("axes {axes:?} must be a permutation of x, y, z"))
                    } else if *scale == 0.0 || !scale.is_finite() {
                        Some(format!("scale must be finite and non-zero, got {scale}"))
                    } else {
                        None
                    }
                }
            }
        }
        FilterStageConfig::Kalman {
            process_noise,
            measurement_noise,
        } if *process_noise <= 0.0 || *measurement_noise <= 0.0 => {
            Some("process_noise and measurement_noise must be > 0".to_string())
        }
        FilterStageConfig::Easing { factor } if *factor <= 0.0 || *factor > 1.0 => {
            Some(format!("factor must be in (0, 1], got {factor}"))
        }
        FilterStageConfig::RateLimit { max_step } if *max_step <= 0.0 => {
            Some(format!("max_step must be > 0, got {max_step}"))
        }
        FilterStageConfig::ContinuityGate { max_jump, .. } if *max_jump <= 0.0 => {
            Some(format!("max_jump must be > 0, got {max_jump}"))
        }
        _ => None,
    };

    match problem {
        Some(message) => Err(ContractError::config_validation(field, message)),
        None => Ok(()),
    }
}

fn validate_sinks(config: &RtlsConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
        if sink.sink_type == SinkType::Network && !sink.params.contains_key("addr") {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].params"),
                "network sink requires an 'addr' parameter",
            ));
        }
        if let Some(list) = sink.params.get("systems") {
            check_route_list::<SystemType>(idx, "systems", list)?;
        }
        if let Some(list) = sink.params.get("trackable_types") {
            check_route_list::<TrackableType>(idx, "trackable_types", list)?;
        }
    }
    Ok(())
}

fn check_route_list<T>(idx: usize, param: &str, list: &str) -> Result<(), ContractError>
where
    T: std::str::FromStr<Err = String>,
{
    for item in list.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        item.parse::<T>().map_err(|message| {
            ContractError::config_validation(format!("sinks[{idx}].params.{param}"), message)
        })?;
    }
    Ok(())
}
