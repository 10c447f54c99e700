//! Postprocessor - one worker thread per output stream
//!
//! `process_and_send` queues a frame; the worker runs the configured
//! stages in order and hands the result to the caller's handler. Frames of
//! one postprocessor are processed strictly FIFO. `reset` travels through
//! the same queue, so the resolver and filters keep a single writer.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use contracts::{
    Frame, FrameEnvelope, FrameHandler, PostprocessorConfig, StageKind, SystemType, TrackableKey,
    TrackableType, Position, Trackable, Worker,
};
use tracing::{debug, info, instrument, trace};

use crate::continuity::{position_of, ContinuityResolver};
use crate::error::{PostprocessError, Result};
use crate::filter::FilterGroup;
use crate::id_dictionary::IdDictionary;

/// Single-threaded stage pipeline of one stream.
///
/// Usable on its own (tests, offline processing); `Postprocessor` runs it
/// on a worker thread.
pub struct FramePipeline {
    name: String,
    stages: Vec<StageKind>,
    dictionary: IdDictionary,
    resolver: ContinuityResolver,
    filters: FilterGroup,
}

impl FramePipeline {
    pub fn new(config: &PostprocessorConfig) -> Self {
        let dictionary = config
            .dictionary_path
            .as_deref()
            .map(IdDictionary::load)
            .unwrap_or_else(IdDictionary::passthrough);
        Self::with_dictionary(config, dictionary)
    }

    pub fn with_dictionary(config: &PostprocessorConfig, dictionary: IdDictionary) -> Self {
        Self {
            name: config.name.clone(),
            stages: config.stages.clone(),
            dictionary,
            resolver: ContinuityResolver::new(config.continuity.clone()),
            filters: FilterGroup::new(&config.filters),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> &ContinuityResolver {
        &self.resolver
    }

    pub fn filters(&self) -> &FilterGroup {
        &self.filters
    }

    /// Run every configured stage over `frame` in order, then remember the
    /// result as the previous frame for continuity.
    pub fn process(&mut self, frame: &mut Frame, now: Instant) {
        for index in 0..self.stages.len() {
            match self.stages[index] {
                StageKind::MapIds => self.map_ids(frame),
                StageKind::RemoveUnidentifiable => remove_unidentifiable(frame),
                StageKind::Continuity => {
                    self.resolver.resolve(frame);
                }
                StageKind::Filters => self.apply_filters(frame, now),
            }
        }
        self.resolver.remember(frame);
    }

    /// Clear continuity mappings and filter state
    pub fn reset(&mut self) {
        self.resolver.reset();
        self.filters.clear();
        info!(postprocessor = %self.name, "postprocessor state reset");
    }

    fn map_ids(&self, frame: &mut Frame) {
        for trackable in &mut frame.trackables {
            // unidentifiable and unset ids are left alone
            if trackable.id <= 0 {
                continue;
            }
            trackable.id = self.dictionary.lookup(trackable.id);
        }
    }

    fn apply_filters(&mut self, frame: &mut Frame, now: Instant) {
        for trackable in &frame.trackables {
            let key = TrackableKey::derive(trackable);
            if key.is_none() {
                continue;
            }
            self.filters.process(&key, position_of(trackable), now);
        }
        self.filters.process_remaining();

        let mut present = std::collections::HashSet::new();
        let mut i = 0;
        while i < frame.trackables.len() {
            let key = TrackableKey::derive(&frame.trackables[i]);
            if key.is_none() {
                i += 1;
                continue;
            }
            let filtered = self
                .filters
                .get(&key)
                .filter(|f| f.is_data_valid())
                .and_then(|f| f.position());
            match filtered {
                Some(p) => {
                    frame.trackables[i].position = Position::new(p.x, p.y, p.z);
                    present.insert(key);
                    i += 1;
                }
                None => {
                    frame.trackables.swap_remove(i);
                }
            }
        }

        // Keys that are still valid but missing from this frame
        for (key, filter) in self.filters.iter() {
            if present.contains(key) || !filter.is_data_valid() {
                continue;
            }
            let Some(p) = filter.position() else { continue };
            let mut trackable = Trackable::at(Position::new(p.x, p.y, p.z));
            if key.reconcile(&mut trackable) {
                trace!(key = %key, "re-emitting filtered trackable");
                frame.trackables.push(trackable);
            }
        }

        self.filters.maybe_cull(now);
    }
}

/// Drop trackables without a usable identity (swap-remove)
pub fn remove_unidentifiable(frame: &mut Frame) {
    let mut i = 0;
    while i < frame.trackables.len() {
        if TrackableKey::derive(&frame.trackables[i]).is_none() {
            frame.trackables.swap_remove(i);
        } else {
            i += 1;
        }
    }
}

enum Work {
    Process(FrameEnvelope, FrameHandler),
    Reset,
}

/// Counters of one postprocessor
#[derive(Debug, Default)]
pub struct PostprocessorMetrics {
    queued: AtomicU64,
    rejected: AtomicU64,
    resets: AtomicU64,
}

/// Point-in-time view of postprocessor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostprocessorSnapshot {
    pub queued: u64,
    pub processed: u64,
    pub panicked: u64,
    pub rejected: u64,
    pub resets: u64,
    pub pending: usize,
}

/// Threaded postprocessor for one (system, trackable type) stream
pub struct Postprocessor {
    name: String,
    system: SystemType,
    trackable_type: TrackableType,
    worker: Worker<Work>,
    metrics: Arc<PostprocessorMetrics>,
}

impl Postprocessor {
    /// Build the pipeline and spawn its worker thread
    #[instrument(name = "postprocessor_new", skip(config), fields(name = %config.name))]
    pub fn new(config: &PostprocessorConfig) -> Result<Self> {
        Self::from_pipeline(config, FramePipeline::new(config))
    }

    /// Like `new`, with an explicit dictionary file
    pub fn with_dictionary_path(config: &PostprocessorConfig, path: &Path) -> Result<Self> {
        let pipeline = FramePipeline::with_dictionary(config, IdDictionary::load(path));
        Self::from_pipeline(config, pipeline)
    }

    fn from_pipeline(config: &PostprocessorConfig, mut pipeline: FramePipeline) -> Result<Self> {
        let name = config.name.clone();
        let worker_name = format!("pp-{name}");
        let gauge_name = name.clone();

        let worker = Worker::spawn(worker_name, move |work: Work| match work {
            Work::Process(mut envelope, handler) => {
                pipeline.process(&mut envelope.frame, Instant::now());
                metrics::counter!("rtls_postprocess_frames_total", "postprocessor" => gauge_name.clone())
                    .increment(1);
                handler(envelope);
            }
            Work::Reset => pipeline.reset(),
        })
        .map_err(|e| PostprocessError::worker(&name, e))?;

        debug!(
            postprocessor = %name,
            system = %config.system,
            trackable_type = %config.trackable_type,
            stages = ?config.stages,
            "postprocessor started"
        );

        Ok(Self {
            name,
            system: config.system,
            trackable_type: config.trackable_type,
            worker,
            metrics: Arc::new(PostprocessorMetrics::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system(&self) -> SystemType {
        self.system
    }

    pub fn trackable_type(&self) -> TrackableType {
        self.trackable_type
    }

    /// Queue `envelope`; `handler` receives it once processed.
    ///
    /// Returns `false` if the postprocessor has shut down or its queue is
    /// full.
    pub fn process_and_send(&self, envelope: FrameEnvelope, handler: FrameHandler) -> bool {
        let accepted = self.worker.push(Work::Process(envelope, handler));
        if accepted {
            self.metrics.queued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
        }
        metrics::gauge!("rtls_postprocess_queue_depth", "postprocessor" => self.name.clone())
            .set(self.worker.pending() as f64);
        accepted
    }

    /// Queue a reset of continuity and filter state, ordered after every
    /// frame already queued.
    pub fn reset(&self) -> bool {
        let accepted = self.worker.push_control(Work::Reset);
        if accepted {
            self.metrics.resets.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    pub fn snapshot(&self) -> PostprocessorSnapshot {
        PostprocessorSnapshot {
            queued: self.metrics.queued.load(Ordering::Relaxed),
            processed: self.worker.processed(),
            panicked: self.worker.panicked(),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            resets: self.metrics.resets.load(Ordering::Relaxed),
            pending: self.worker.pending(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stop the worker; queued frames are dropped
    pub fn shutdown(&self) {
        self.worker.shutdown();
        debug!(postprocessor = %self.name, "postprocessor stopped");
    }
}
