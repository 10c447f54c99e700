//! SinkHandle - one sink behind its own bounded queue and worker task
//!
//! A slow or failing sink only ever loses its own frames. Each handle may
//! carry a [`RouteFilter`] so a sink sees only the systems and trackable
//! types it asked for.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use contracts::{DataSink, FrameEnvelope, SystemType, TrackableType};

use crate::metrics::SinkMetrics;

/// Which envelopes a sink receives.
///
/// Built from the sink's `params`: `systems` and `trackable_types` are comma
/// separated allow lists (empty or absent means all), `playback` set to
/// `false` keeps replayed frames out of the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFilter {
    systems: Vec<SystemType>,
    trackable_types: Vec<TrackableType>,
    playback: bool,
}

impl Default for RouteFilter {
    fn default() -> Self {
        Self {
            systems: Vec::new(),
            trackable_types: Vec::new(),
            playback: true,
        }
    }
}

impl RouteFilter {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let systems = match params.get("systems") {
            Some(list) => parse_list(list)?,
            None => Vec::new(),
        };
        let trackable_types = match params.get("trackable_types") {
            Some(list) => parse_list(list)?,
            None => Vec::new(),
        };
        let playback = match params.get("playback").map(|v| v.trim()) {
            None | Some("") => true,
            Some(value) => value
                .parse::<bool>()
                .map_err(|_| format!("playback must be true or false, got '{value}'"))?,
        };
        Ok(Self {
            systems,
            trackable_types,
            playback,
        })
    }

    pub fn systems(mut self, systems: &[SystemType]) -> Self {
        self.systems = systems.to_vec();
        self
    }

    pub fn trackable_types(mut self, types: &[TrackableType]) -> Self {
        self.trackable_types = types.to_vec();
        self
    }

    pub fn playback(mut self, playback: bool) -> Self {
        self.playback = playback;
        self
    }

    pub fn accepts(&self, envelope: &FrameEnvelope) -> bool {
        (self.playback || !envelope.is_playback())
            && (self.systems.is_empty() || self.systems.contains(&envelope.system))
            && (self.trackable_types.is_empty()
                || self.trackable_types.contains(&envelope.trackable_type))
    }

    pub fn is_pass_all(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_list<T: std::str::FromStr<Err = String>>(list: &str) -> Result<Vec<T>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    filter: RouteFilter,
    tx: mpsc::Sender<FrameEnvelope>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink` with a queue of `queue_capacity`
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = tokio::spawn(sink_worker(sink, rx, Arc::clone(&metrics), name.clone()));

        Self {
            name,
            filter: RouteFilter::default(),
            tx,
            metrics,
            worker,
        }
    }

    pub fn with_filter(mut self, filter: RouteFilter) -> Self {
        if !filter.is_pass_all() {
            debug!(sink = %self.name, filter = ?filter, "sink route filter set");
        }
        self.filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a frame for the sink without waiting.
    ///
    /// Returns false when the frame was not queued: filtered out, queue
    /// full (counted as a drop) or worker gone.
    pub fn try_send(&self, envelope: FrameEnvelope) -> bool {
        if !self.filter.accepts(&envelope) {
            self.metrics.inc_filtered_count();
            trace!(sink = %self.name, route = %envelope.context(), "frame filtered");
            return false;
        }
        match self.tx.try_send(envelope) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    system = %dropped.system,
                    frame_id = dropped.frame.frame_id,
                    "sink queue full, frame dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker gone");
                false
            }
        }
    }

    /// Close the queue and wait for the worker to write what it holds
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
        debug!(sink = %self.name, "sink stopped");
    }
}

async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<FrameEnvelope>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "sink worker started");

    while let Some(envelope) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        if let Err(e) = sink.write(&envelope).await {
            metrics.inc_failure_count();
            error!(
                sink = %name,
                route = %envelope.context(),
                frame_id = envelope.frame.frame_id,
                error = %e,
                "sink write failed"
            );
            continue;
        }
        metrics.inc_write_count();
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "sink flush failed");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "sink close failed");
    }
    debug!(sink = %name, "sink worker stopped");
}
