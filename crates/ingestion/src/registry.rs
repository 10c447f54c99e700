//! Source registry - start/stop N tracking sources as one unit

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{FrameCallback, SourceFrame, SystemType, TrackingSource};
use tracing::{debug, error, info, instrument, trace};

use crate::error::{IngestionError, Result};
use crate::metrics::IngestionMetrics;

/// Registered tracking sources, at most one per system
pub struct SourceRegistry {
    sources: BTreeMap<SystemType, Arc<dyn TrackingSource>>,
    metrics: Arc<IngestionMetrics>,
    active: Arc<AtomicBool>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a source under its own system type
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(source = %source.name(), system = %source.system_type())
    )]
    pub fn register(&mut self, source: Arc<dyn TrackingSource>) -> Result<()> {
        let system = source.system_type();
        if self.sources.contains_key(&system) {
            return Err(IngestionError::AlreadyRegistered { system });
        }
        debug!(system = %system, "registered tracking source");
        self.sources.insert(system, source);
        Ok(())
    }

    /// Start every source. `make_callback` yields the downstream callback
    /// of each system.
    ///
    /// A source that fails to start is logged and skipped; the others keep
    /// running. Returns the number of sources started.
    #[instrument(name = "ingestion_start_all", skip(self, make_callback))]
    pub fn start_all<F>(&self, make_callback: F) -> usize
    where
        F: Fn(SystemType) -> FrameCallback,
    {
        self.active.store(true, Ordering::SeqCst);
        info!(count = self.sources.len(), "starting tracking sources");

        let mut started = 0;
        for (system, source) in &self.sources {
            let downstream = make_callback(*system);
            let metrics = self.metrics.clone();
            let active = self.active.clone();
            let system = *system;
            let callback: FrameCallback = Arc::new(move |frame: SourceFrame| {
                if !active.load(Ordering::Relaxed) {
                    metrics.record_ignored();
                    return;
                }
                metrics.record_frame(frame.frame.len());
                metrics::counter!("rtls_frames_received_total", "system" => system.as_str())
                    .increment(1);
                trace!(system = %system, trackables = frame.frame.len(), "source frame");
                downstream(frame);
            });

            match source.start(callback) {
                Ok(()) => started += 1,
                Err(e) => {
                    self.metrics.record_start_failure();
                    let e = IngestionError::start_failed(source.name(), e);
                    error!(system = %system, error = %e, "source failed to start");
                }
            }
        }
        started
    }

    /// Stop every source
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(count = self.sources.len(), "stopping tracking sources");
        for (system, source) in &self.sources {
            if source.is_connected() {
                debug!(system = %system, "stopping source");
            }
            source.stop();
        }
    }

    pub fn is_connected(&self, system: SystemType) -> Result<bool> {
        self.sources
            .get(&system)
            .map(|s| s.is_connected())
            .ok_or(IngestionError::NotRegistered { system })
    }

    pub fn source(&self, system: SystemType) -> Option<&Arc<dyn TrackingSource>> {
        self.sources.get(&system)
    }

    pub fn systems(&self) -> impl Iterator<Item = SystemType> + '_ {
        self.sources.keys().copied()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }
}

impl Drop for SourceRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedSource;
    use contracts::{Frame, Position, Trackable};
    use std::sync::Mutex;

    #[test]
    fn test_registry_creation() {
        let registry = SourceRegistry::new();
        assert_eq!(registry.source_count(), 0);
        assert!(matches!(
            registry.is_connected(SystemType::Null),
            Err(IngestionError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_duplicate_system_rejected() {
        let mut registry = SourceRegistry::new();
        registry
            .register(Arc::new(ScriptedSource::manual("a", SystemType::Null)))
            .unwrap();
        let err = registry
            .register(Arc::new(ScriptedSource::manual("b", SystemType::Null)))
            .unwrap_err();
        assert!(matches!(err, IngestionError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_frames_routed_per_system_and_counted() {
        let null = Arc::new(ScriptedSource::manual("null", SystemType::Null));
        let motive = Arc::new(ScriptedSource::manual("motive", SystemType::Motive));
        let mut registry = SourceRegistry::new();
        registry.register(null.clone()).unwrap();
        registry.register(motive.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let started = registry.start_all(|system| {
            let seen = seen.clone();
            let cb: FrameCallback =
                Arc::new(move |_frame: SourceFrame| seen.lock().unwrap().push(system));
            cb
        });
        assert_eq!(started, 2);
        assert!(registry.is_connected(SystemType::Motive).unwrap());

        let frame = || {
            SourceFrame::samples(Frame::new(vec![
                Trackable::at(Position::default()),
                Trackable::at(Position::default()),
            ]))
        };
        motive.emit(frame());
        null.emit(frame());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SystemType::Motive, SystemType::Null]
        );
        let snap = registry.metrics().snapshot();
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.trackables_received, 4);

        registry.stop_all();
        assert!(!registry.is_connected(SystemType::Null).unwrap());
    }
}
