//! Output-side metrics
//!
//! Facade recorders for frames leaving the engine, plus an in-memory
//! aggregator used for run summaries.

use std::collections::BTreeMap;

use contracts::{FrameEnvelope, FrameOrigin, LatencySample};
use metrics::{counter, gauge, histogram};

/// Record one processed frame delivered on the new-frame event.
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_frame_output;
///
/// while let Ok(envelope) = frames.recv().await {
///     record_frame_output(&envelope);
/// }
/// ```
pub fn record_frame_output(envelope: &FrameEnvelope) {
    let route = envelope.context().to_string();
    let origin = match envelope.origin {
        FrameOrigin::Live => "live",
        FrameOrigin::Playback => "playback",
    };

    counter!(
        "rtls_frames_output_total",
        "route" => route.clone(),
        "origin" => origin
    )
    .increment(1);

    gauge!("rtls_last_frame_id", "system" => envelope.system.as_str())
        .set(envelope.frame.frame_id as f64);

    histogram!("rtls_frame_trackables", "route" => route).record(envelope.frame.len() as f64);

    let unidentified = envelope.frame.trackables.iter().filter(|t| t.id < 0).count();
    if unidentified > 0 {
        counter!("rtls_unidentifiable_trackables_total", "system" => envelope.system.as_str())
            .increment(unidentified as u64);
    }
}

/// Record a latency measurement
pub fn record_latency_sample(sample: &LatencySample) {
    histogram!("rtls_latency_smoothed_ms", "system" => sample.system.as_str())
        .record(sample.smoothed_ms);
}

/// Record a sink's final counters
pub fn record_sink_totals(sink: &str, written: u64, dropped: u64, errors: u64) {
    gauge!("rtls_sink_written", "sink" => sink.to_string()).set(written as f64);
    gauge!("rtls_sink_dropped", "sink" => sink.to_string()).set(dropped as f64);
    gauge!("rtls_sink_errors", "sink" => sink.to_string()).set(errors as f64);
}

/// In-memory aggregation of output frames
#[derive(Debug, Clone, Default)]
pub struct FrameMetricsAggregator {
    pub total_frames: u64,
    pub playback_frames: u64,
    /// Frames per `system/trackable_type` route
    pub per_route: BTreeMap<String, u64>,
    /// Trackables per frame
    pub trackable_stats: RunningStats,
    /// Fraction of trackables carrying a usable identity
    pub identified_stats: RunningStats,
    pub latency_stats: RunningStats,
}

impl FrameMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, envelope: &FrameEnvelope) {
        self.total_frames += 1;
        if envelope.is_playback() {
            self.playback_frames += 1;
        }
        *self
            .per_route
            .entry(envelope.context().to_string())
            .or_insert(0) += 1;

        let frame = &envelope.frame;
        self.trackable_stats.push(frame.len() as f64);
        if !frame.is_empty() {
            let identified = frame
                .trackables
                .iter()
                .filter(|t| t.id > 0 || !t.cuid.is_empty() || !t.name.is_empty())
                .count();
            self.identified_stats
                .push(identified as f64 / frame.len() as f64);
        }
    }

    pub fn record_latency(&mut self, sample: &LatencySample) {
        self.latency_stats.push(sample.latency_ms);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames,
            playback_frames: self.playback_frames,
            per_route: self.per_route.clone(),
            trackables: StatsSummary::from(&self.trackable_stats),
            identified_ratio: StatsSummary::from(&self.identified_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Output summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub playback_frames: u64,
    pub per_route: BTreeMap<String, u64>,
    pub trackables: StatsSummary,
    pub identified_ratio: StatsSummary,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Output Summary ===")?;
        writeln!(
            f,
            "Total frames: {} ({} from playback)",
            self.total_frames, self.playback_frames
        )?;
        for (route, count) in &self.per_route {
            writeln!(f, "  {}: {}", route, count)?;
        }
        writeln!(f, "Trackables per frame: {}", self.trackables)?;
        writeln!(f, "Identified ratio: {}", self.identified_ratio)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        Ok(())
    }
}

/// Summary of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Frame, Position, SystemType, Trackable, TrackableType};

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = FrameMetricsAggregator::new();
        let frame = Frame::new(vec![
            Trackable::at(Position::default()).with_id(1),
            Trackable::at(Position::default()).with_id(-1),
        ]);
        let live = FrameEnvelope::new(SystemType::Null, TrackableType::Sample, frame.clone());
        let replayed = FrameEnvelope::new(SystemType::Motive, TrackableType::Observer, frame)
            .with_origin(FrameOrigin::Playback);

        aggregator.update(&live);
        aggregator.update(&replayed);
        aggregator.record_latency(&LatencySample {
            system: SystemType::Null,
            latency_ms: 2.0,
            smoothed_ms: 2.0,
        });

        assert_eq!(aggregator.total_frames, 2);
        assert_eq!(aggregator.playback_frames, 1);
        assert_eq!(aggregator.per_route.get("null/sample"), Some(&1));
        assert_eq!(aggregator.per_route.get("motive/observer"), Some(&1));
        assert!((aggregator.identified_stats.mean() - 0.5).abs() < 1e-10);
        assert_eq!(aggregator.latency_stats.count(), 1);
    }

    #[test]
    fn test_summary_display() {
        let mut summary = MetricsSummary {
            total_frames: 100,
            playback_frames: 40,
            trackables: StatsSummary {
                count: 100,
                min: 2.0,
                max: 6.0,
                mean: 4.0,
                std_dev: 1.0,
            },
            ..Default::default()
        };
        summary.per_route.insert("null/sample".into(), 100);

        let output = format!("{}", summary);
        assert!(output.contains("Total frames: 100 (40 from playback)"));
        assert!(output.contains("null/sample: 100"));
        assert!(output.contains("Latency (ms): N/A"));
    }
}
