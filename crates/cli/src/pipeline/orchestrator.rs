//! Pipeline orchestrator - wires sources, engine, sinks, recorder and player.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_channel::Receiver;
use contracts::{FrameEnvelope, LatencySample, PlaybackTarget, RtlsConfig};
use dispatcher::{DispatcherBuilder, DispatcherConfig, FusionEngine, SinkHandle};
use observability::{
    record_frame_output, record_latency_sample, record_sink_totals, FrameMetricsAggregator,
};
use recorder::{Player, Recorder, RecorderSink, RecordingEvent};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

const RECORDER_QUEUE_CAPACITY: usize = 1024;
const SINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const SAVE_TIMEOUT: Duration = Duration::from_secs(30);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Server configuration, CLI overrides already applied
    pub config: RtlsConfig,

    /// Stop after this long (None = until shutdown)
    pub duration: Option<Duration>,

    /// Record a take for the whole run
    pub record: bool,

    /// Take to play; overrides `playback.take_path` and always autoplays
    pub play: Option<PathBuf>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Recorder and player, present when `player` is enabled
struct TakeControl {
    recorder: Arc<Recorder>,
    player: Arc<Player>,
}

impl TakeControl {
    /// Playing a take ends any recording in progress
    fn start_playback(&self) -> Result<()> {
        if self.recorder.is_recording() {
            warn!("Starting playback stops the active recording");
            self.recorder
                .stop_recording(None)
                .context("Failed to stop recording before playback")?;
        }
        self.player.play().context("Failed to start playback")?;
        Ok(())
    }

    fn log_status(&self) {
        info!(
            recorder = %self.recorder.status(),
            player = %self.player.status(),
            "Take status"
        );
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the duration elapses or `shutdown` resolves, then tear
    /// everything down in order and collect statistics.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let cfg = &self.config.config;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        // Engine and its consumers exist before any source starts
        let engine = Arc::new(FusionEngine::new(cfg).context("Failed to start fusion engine")?);
        let stats_task = tokio::spawn(consume_output(
            engine.subscribe(),
            engine.subscribe_latency(),
        ));
        let sink_rx = engine.subscribe();

        let takes = if cfg.player {
            let recorder = Arc::new(
                Recorder::new(cfg.recorder.clone()).context("Failed to start recorder")?,
            );
            let target: Arc<dyn PlaybackTarget> = engine.clone();
            let player = Arc::new(Player::new(cfg.playback.clone(), target));
            Some(TakeControl { recorder, player })
        } else {
            info!("Recorder and player disabled");
            None
        };

        let mut builder = DispatcherBuilder::new(
            DispatcherConfig {
                sinks: cfg.sinks.clone(),
            },
            sink_rx,
        );
        if let Some(takes) = &takes {
            builder = builder.with_handle(SinkHandle::spawn(
                RecorderSink::new("recorder", Arc::clone(&takes.recorder)),
                RECORDER_QUEUE_CAPACITY,
            ));
        }
        let dispatcher = builder.build().await.context("Failed to create dispatcher")?;
        if cfg.sinks.is_empty() {
            warn!("No sinks configured - processed frames are only counted");
        }
        info!(sinks = dispatcher.sink_count(), "Dispatcher started");
        let dispatcher_handle = dispatcher.spawn();

        let watcher = takes.as_ref().map(|takes| {
            let (stop_tx, stop_rx) = oneshot::channel();
            let task = tokio::spawn(watch_recordings(
                takes.recorder.subscribe(),
                Arc::clone(&takes.player),
                stop_rx,
            ));
            (stop_tx, task)
        });

        let registry = ingestion::build_registry(cfg);
        let sources_started = registry.start_all(|system| engine.source_callback(system));
        info!(sources_started, "Tracking sources started");

        if let Some(takes) = &takes {
            if self.config.record {
                let path = takes
                    .recorder
                    .start_recording(None)
                    .context("Failed to start recording")?;
                info!(path = %path.display(), "Recording");
            }

            let take_path = self
                .config
                .play
                .clone()
                .or_else(|| cfg.playback.take_path.clone());
            if let Some(path) = take_path {
                takes
                    .player
                    .load(&path)
                    .map_err(|e| CliError::take_load(&path, e))?;
                if self.config.play.is_some() || cfg.playback.autoplay {
                    takes.start_playback()?;
                }
            }
        } else if self.config.record || self.config.play.is_some() {
            return Err(CliError::pipeline_execution(
                "recording and playback need `player = true` in the configuration",
            )
            .into());
        }

        let run_for = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(run_for);
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut run_for => {
                    info!("Run duration reached");
                    break;
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    break;
                }
                _ = ticker.tick() => {
                    for status in engine.statuses() {
                        info!(
                            system = %status.system,
                            fps = format!("{:.1}", status.fps),
                            receiving = status.receiving,
                            playback = status.playback_active,
                            "Source status"
                        );
                    }
                    if let Some(takes) = &takes {
                        takes.log_status();
                    }
                }
            }
        }

        info!("Shutting down pipeline...");
        let mut stats = PipelineStats {
            sources_started,
            ..Default::default()
        };

        if let Some(takes) = &takes {
            takes.player.stop();
            stats.playback_frames = takes.player.frames_emitted();
            stats.playback_loops = takes.player.loops();
            if takes.recorder.is_recording() {
                if let Err(e) = takes.recorder.stop_recording(None) {
                    warn!(error = %e, "Failed to stop recording");
                }
            }
        }

        registry.stop_all();
        stats.ingestion = registry.metrics().snapshot();
        stats.sources = engine.statuses();
        stats.postprocessors = engine.postprocessor_snapshots();
        stats.latency_ms = engine.latency_ms();

        // Closing the buses ends the dispatcher and the stats consumer
        engine.shutdown();

        stats.sinks = match tokio::time::timeout(SINK_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(error = %e, "Dispatcher task failed");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_secs = SINK_DRAIN_TIMEOUT.as_secs(), "Sinks did not drain in time");
                Vec::new()
            }
        };
        for (name, m) in &stats.sinks {
            record_sink_totals(name, m.write_count, m.dropped_count, m.failure_count);
        }
        stats.output = stats_task.await.unwrap_or_default();

        if let Some(takes) = takes {
            let recorder = Arc::clone(&takes.recorder);
            let idle = tokio::task::spawn_blocking(move || recorder.wait_idle(SAVE_TIMEOUT))
                .await
                .unwrap_or(false);
            if !idle {
                warn!("Take still saving at shutdown; it is discarded");
            }
            if let Some((stop_tx, task)) = watcher {
                let _ = stop_tx.send(());
                stats.takes_saved = task.await.unwrap_or_default();
            }
            takes.recorder.shutdown();
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Count every output frame and latency sample until the engine closes
async fn consume_output(
    frames: Receiver<FrameEnvelope>,
    latency: Receiver<LatencySample>,
) -> FrameMetricsAggregator {
    let mut aggregator = FrameMetricsAggregator::new();
    let mut latency_open = true;
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(envelope) => {
                    record_frame_output(&envelope);
                    aggregator.update(&envelope);
                }
                Err(_) => break,
            },
            sample = latency.recv(), if latency_open => match sample {
                Ok(sample) => {
                    record_latency_sample(&sample);
                    aggregator.record_latency(&sample);
                }
                Err(_) => latency_open = false,
            },
        }
    }
    debug!(frames = aggregator.total_frames, "Output consumer stopped");
    aggregator
}

/// Follow recording events; a saved take is offered to the player.
///
/// Returns the paths of takes saved before `stop` fired.
async fn watch_recordings(
    mut events: broadcast::Receiver<RecordingEvent>,
    player: Arc<Player>,
    mut stop: oneshot::Receiver<()>,
) -> Vec<PathBuf> {
    let mut saved = Vec::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => on_recording_event(event, &player, &mut saved),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Recording events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut stop => {
                while let Ok(event) = events.try_recv() {
                    on_recording_event(event, &player, &mut saved);
                }
                break;
            }
        }
    }
    saved
}

fn on_recording_event(event: RecordingEvent, player: &Player, saved: &mut Vec<PathBuf>) {
    match event {
        RecordingEvent::Began { path } => {
            info!(path = %path.display(), "Recording began");
        }
        RecordingEvent::Ended { path, saved: true } => {
            if player.offer(&path) {
                info!(path = %path.display(), "Saved take loaded for playback");
            }
            saved.push(path);
        }
        RecordingEvent::Ended { path, saved: false } => {
            warn!(path = %path.display(), "Recording ended without a saved take");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemType;
    use tempfile::tempdir;

    fn config(take_folder: PathBuf) -> RtlsConfig {
        let mut config = RtlsConfig {
            systems: vec![SystemType::Null],
            ..Default::default()
        };
        config.null_source.fps = 60.0;
        config.null_source.count = 3;
        config.recorder.take_folder = take_folder;
        config
    }

    #[tokio::test]
    async fn test_run_for_duration_counts_output() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            config: config(dir.path().to_path_buf()),
            duration: Some(Duration::from_millis(400)),
            record: false,
            play: None,
            metrics_port: None,
        });

        let stats = pipeline.run(std::future::pending()).await.unwrap();
        assert_eq!(stats.sources_started, 1);
        assert!(stats.output.total_frames > 0);
        assert!(stats.takes_saved.is_empty());
        assert_eq!(stats.sinks.len(), 1, "recorder sink only");
    }

    #[tokio::test]
    async fn test_record_saves_take() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            config: config(dir.path().to_path_buf()),
            duration: Some(Duration::from_millis(400)),
            record: true,
            play: None,
            metrics_port: None,
        });

        let stats = pipeline.run(std::future::pending()).await.unwrap();
        assert_eq!(stats.takes_saved.len(), 1);
        let path = &stats.takes_saved[0];
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_run() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            config: config(dir.path().to_path_buf()),
            duration: None,
            record: false,
            play: None,
            metrics_port: None,
        });

        let stats = pipeline
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert!(stats.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_play_requires_player() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path().to_path_buf());
        cfg.player = false;
        let pipeline = Pipeline::new(PipelineConfig {
            config: cfg,
            duration: Some(Duration::from_millis(50)),
            record: true,
            play: None,
            metrics_port: None,
        });
        assert!(pipeline.run(std::future::pending()).await.is_err());
    }
}
