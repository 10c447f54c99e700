//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::RtlsConfig;
use std::time::Duration;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::error::load_config;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut config, args);

    info!(
        project = %config.project.name,
        systems = ?config.systems,
        postprocess = config.postprocess,
        player = config.player,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        config,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        record: args.record,
        play: args.play.clone(),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        frames_output = stats.output.total_frames,
        frames_suppressed = stats.frames_suppressed(),
        sink_drops = stats.sink_drops(),
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("rtls-server finished");
    Ok(())
}

/// Fold command-line overrides into the loaded configuration
fn apply_overrides(config: &mut RtlsConfig, args: &RunArgs) {
    if args.loop_playback {
        info!("Overriding playback loop from CLI");
        config.playback.loop_playback = true;
    }
    if let Some(speed) = args.speed.filter(|s| *s > 0.0) {
        info!(speed, "Overriding playback speed from CLI");
        config.playback.speed = speed;
    }
    if let Some(ref folder) = args.take_folder {
        info!(folder = %folder.display(), "Overriding take folder from CLI");
        config.recorder.take_folder = folder.clone();
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed
/// never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &RtlsConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Project: {}", config.project.name);
    println!("Systems: {:?}", config.systems);
    println!("Postprocessing: {}", config.postprocess);

    let streams = config.effective_postprocessors();
    println!("\nPostprocessors ({}):", streams.len());
    for pp in &streams {
        println!(
            "  - {} ({}/{}) stages={:?}",
            pp.name, pp.system, pp.trackable_type, pp.stages
        );
    }

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!("\nTakes:");
    println!("  Player enabled: {}", config.player);
    println!("  Take folder: {}", config.recorder.take_folder.display());
    if let Some(ref path) = config.playback.take_path {
        println!("  Playback take: {}", path.display());
    }
    println!(
        "  Loop: {}, speed: {}x, autoplay: {}",
        config.playback.loop_playback, config.playback.speed, config.playback.autoplay
    );

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn args(extra: &[&str]) -> RunArgs {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            run: RunArgs,
        }
        let mut argv = vec!["run"];
        argv.extend_from_slice(extra);
        Wrapper::parse_from(argv).run
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = RtlsConfig::default();
        config.playback.loop_playback = false;
        apply_overrides(
            &mut config,
            &args(&["--loop", "--speed", "2.5", "--take-folder", "/tmp/takes"]),
        );
        assert!(config.playback.loop_playback);
        assert_eq!(config.playback.speed, 2.5);
        assert_eq!(config.recorder.take_folder, PathBuf::from("/tmp/takes"));
    }

    #[test]
    fn test_non_positive_speed_ignored() {
        let mut config = RtlsConfig::default();
        apply_overrides(&mut config, &args(&["--speed", "0"]));
        assert_eq!(config.playback.speed, 1.0);
    }
}
