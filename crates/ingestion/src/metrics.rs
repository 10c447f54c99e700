//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every source of a registry
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Raw frames delivered by sources
    pub frames_received: AtomicU64,

    /// Trackables across all received frames
    pub trackables_received: AtomicU64,

    /// Frames delivered after the registry stopped
    pub frames_ignored: AtomicU64,

    /// Sources that failed to start
    pub start_failures: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, trackables: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.trackables_received
            .fetch_add(trackables as u64, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_start_failure(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            trackables_received: self.trackables_received.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub trackables_received: u64,
    pub frames_ignored: u64,
    pub start_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let metrics = IngestionMetrics::new();
        metrics.record_frame(3);
        metrics.record_frame(2);
        metrics.record_ignored();
        let snap = metrics.snapshot();
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.trackables_received, 5);
        assert_eq!(snap.frames_ignored, 1);
        assert_eq!(snap.start_failures, 0);
    }
}
