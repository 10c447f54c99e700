//! Pipeline statistics and metrics.

use std::path::PathBuf;
use std::time::Duration;

use dispatcher::{MetricsSnapshot, SourceStatus};
use observability::FrameMetricsAggregator;
use postprocess::PostprocessorSnapshot;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Tracking sources that started
    pub sources_started: usize,

    /// Frames handed over by the tracking sources
    pub ingestion: ingestion::MetricsSnapshot,

    /// Per-system engine status at shutdown
    pub sources: Vec<SourceStatus>,

    /// Per-stream postprocessor counters at shutdown
    pub postprocessors: Vec<(String, PostprocessorSnapshot)>,

    /// Per-sink counters after the dispatcher drained
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Aggregated output frames
    pub output: FrameMetricsAggregator,

    /// Smoothed latency when the run ended
    pub latency_ms: Option<f64>,

    /// Takes written during the run
    pub takes_saved: Vec<PathBuf>,

    /// Times the playback take wrapped around
    pub playback_loops: u64,

    /// Frames emitted by the player
    pub playback_frames: u64,
}

impl PipelineStats {
    /// Output frames per second over the whole run
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.output.total_frames as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Frames suppressed by playback, summed over all systems
    pub fn frames_suppressed(&self) -> u64 {
        self.sources.iter().map(|s| s.frames_suppressed).sum()
    }

    /// Frames dropped by sink queues
    pub fn sink_drops(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.dropped_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Sources started: {}", self.sources_started);
        println!("  Frames received: {}", self.ingestion.frames_received);
        println!("  Frames output: {}", self.output.total_frames);
        println!("  Output FPS: {:.2}", self.fps());
        if let Some(latency) = self.latency_ms {
            println!("  Latency: {latency:.2} ms");
        }

        if !self.sources.is_empty() {
            println!("\nSources");
            for s in &self.sources {
                println!(
                    "  {}: {:.1} fps, receiving={}, dispatched={}, suppressed={}",
                    s.system, s.fps, s.receiving, s.frames_dispatched, s.frames_suppressed
                );
            }
        }

        if !self.postprocessors.is_empty() {
            println!("\nPostprocessors");
            for (name, pp) in &self.postprocessors {
                println!(
                    "  {}: processed={}, recovered={}, resets={}, pending={}",
                    name, pp.processed, pp.panicked, pp.resets, pp.pending
                );
            }
        }

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (name, m) in &self.sinks {
                println!(
                    "  {}: written={}, failed={}, dropped={}",
                    name, m.write_count, m.failure_count, m.dropped_count
                );
            }
        }

        if self.playback_frames > 0 || !self.takes_saved.is_empty() {
            println!("\nTakes");
            println!(
                "  Playback frames: {} ({} loops)",
                self.playback_frames, self.playback_loops
            );
            for path in &self.takes_saved {
                println!("  Saved: {}", path.display());
            }
        }

        println!("\n{}", self.output.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemType;

    #[test]
    fn test_fps_and_totals() {
        let mut stats = PipelineStats {
            duration: Duration::from_secs(2),
            ..Default::default()
        };
        stats.output.total_frames = 60;
        stats.sources.push(SourceStatus {
            system: SystemType::Null,
            fps: 30.0,
            receiving: true,
            playback_active: false,
            frames_received: 70,
            frames_dispatched: 60,
            frames_suppressed: 10,
        });
        stats.sinks.push((
            "log".to_string(),
            MetricsSnapshot {
                queue_len: 0,
                write_count: 58,
                failure_count: 0,
                dropped_count: 2,
                filtered_count: 0,
            },
        ));

        assert!((stats.fps() - 30.0).abs() < f64::EPSILON);
        assert_eq!(stats.frames_suppressed(), 10);
        assert_eq!(stats.sink_drops(), 2);
    }

    #[test]
    fn test_fps_zero_duration() {
        assert_eq!(PipelineStats::default().fps(), 0.0);
    }
}
