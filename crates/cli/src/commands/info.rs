//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{EngineConfig, FilterStageConfig, RtlsConfig, StageKind, SystemType};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::load_config;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    project: String,
    systems: Vec<SystemType>,
    postprocess: bool,
    engine: EngineConfig,
    postprocessors: Vec<PostprocessorInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    takes: TakeInfo,
}

#[derive(Serialize)]
struct PostprocessorInfo {
    name: String,
    route: String,
    stages: Vec<StageKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dictionary: Option<String>,
    radius: f32,
    temporary_keys: String,
    permanent_keys: String,
    filters: Vec<String>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

#[derive(Serialize)]
struct TakeInfo {
    enabled: bool,
    take_folder: String,
    take_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    playback_take: Option<String>,
    loop_playback: bool,
    speed: f32,
    autoplay: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let info = build_config_info(&config);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn filter_name(stage: &FilterStageConfig) -> String {
    match stage {
        FilterStageConfig::AgeGate { min_samples, max_missing } => {
            format!("age_gate({min_samples}/{max_missing})")
        }
        FilterStageConfig::AxisRemap { axes, scale } => {
            format!("axis_remap({} x{scale})", axes.join(","))
        }
        FilterStageConfig::Kalman { .. } => "kalman".to_string(),
        FilterStageConfig::Easing { factor } => format!("easing({factor})"),
        FilterStageConfig::RateLimit { max_step } => format!("rate_limit({max_step})"),
        FilterStageConfig::ContinuityGate { max_jump, .. } => {
            format!("continuity_gate({max_jump})")
        }
    }
}

fn build_config_info(config: &RtlsConfig) -> ConfigInfo {
    let postprocessors = if config.postprocess {
        config
            .effective_postprocessors()
            .into_iter()
            .map(|pp| PostprocessorInfo {
                route: format!("{}/{}", pp.system, pp.trackable_type),
                stages: pp.stages.clone(),
                dictionary: pp.dictionary_path.as_ref().map(|p| p.display().to_string()),
                radius: pp.continuity.radius,
                temporary_keys: pp.continuity.temporary_key_types.clone(),
                permanent_keys: pp.continuity.permanent_key_types.clone(),
                filters: pp.filters.stages.iter().map(filter_name).collect(),
                name: pp.name,
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = config
        .sinks
        .iter()
        .map(|s| SinkInfo {
            name: s.name.clone(),
            sink_type: format!("{:?}", s.sink_type),
            queue_capacity: s.queue_capacity,
        })
        .collect();

    ConfigInfo {
        project: config.project.name.clone(),
        systems: config.systems.clone(),
        postprocess: config.postprocess,
        engine: config.engine.clone(),
        postprocessors,
        sinks,
        takes: TakeInfo {
            enabled: config.player,
            take_folder: config.recorder.take_folder.display().to_string(),
            take_prefix: config.recorder.take_prefix.clone(),
            playback_take: config
                .playback
                .take_path
                .as_ref()
                .map(|p| p.display().to_string()),
            loop_playback: config.playback.loop_playback,
            speed: config.playback.speed,
            autoplay: config.playback.autoplay,
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== rtls-server configuration: {} ===\n", info.project);

    println!("Systems: {:?}", info.systems);
    println!(
        "Engine: stop_gap={}ms poll={}ms fps_window={}ms",
        info.engine.stop_gap_ms, info.engine.poll_interval_ms, info.engine.fps_window_ms
    );

    if info.postprocess {
        println!("\nPostprocessors ({})", info.postprocessors.len());
        for pp in &info.postprocessors {
            println!("  {} [{}]", pp.name, pp.route);
            println!("    stages: {:?}", pp.stages);
            println!(
                "    continuity: radius={} temporary={} permanent={}",
                pp.radius, pp.temporary_keys, pp.permanent_keys
            );
            if let Some(ref dict) = pp.dictionary {
                println!("    dictionary: {dict}");
            }
            if !pp.filters.is_empty() {
                println!("    filters: {}", pp.filters.join(" -> "));
            }
        }
    } else {
        println!("\nPostprocessing disabled");
    }

    if !info.sinks.is_empty() {
        println!("\nSinks ({})", info.sinks.len());
        for sink in &info.sinks {
            println!(
                "  {} ({}, queue {})",
                sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    let takes = &info.takes;
    println!("\nTakes");
    println!("  enabled: {}", takes.enabled);
    println!("  folder: {} (prefix '{}')", takes.take_folder, takes.take_prefix);
    if let Some(ref take) = takes.playback_take {
        println!("  playback: {take}");
    }
    println!(
        "  loop={} speed={}x autoplay={}",
        takes.loop_playback, takes.speed, takes.autoplay
    );

    println!();
}
