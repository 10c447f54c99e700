//! Per-sink counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between a [`SinkHandle`](crate::SinkHandle) and its worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    write_count: AtomicU64,
    failure_count: AtomicU64,
    /// Frames lost to a full queue
    dropped_count: AtomicU64,
    /// Frames the sink's route filter did not want
    filtered_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn filtered_count(&self) -> u64 {
        self.filtered_count.load(Ordering::Relaxed)
    }

    pub fn inc_filtered_count(&self) {
        self.filtered_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            filtered_count: self.filtered_count(),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`] for summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub filtered_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = SinkMetrics::new();
        metrics.inc_write_count();
        metrics.inc_write_count();
        metrics.inc_dropped_count();
        metrics.inc_filtered_count();
        metrics.set_queue_len(3);
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                queue_len: 3,
                write_count: 2,
                failure_count: 0,
                dropped_count: 1,
                filtered_count: 1,
            }
        );
    }
}
