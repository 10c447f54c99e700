//! FusionEngine - single convergence point of every tracking source
//!
//! Per incoming frame:
//! 1. reject disabled systems, invalid routes and live frames of a system
//!    whose take is playing
//! 2. stamp a per-system sequence number and a wall-clock timestamp
//! 3. tag the frame context with system and trackable type
//! 4. record the arrival for FPS and liveness
//! 5. route to the stream's postprocessor, or publish directly when
//!    postprocessing is off
//!
//! Published frames carry an arrival-to-dispatch latency sample. A poll
//! thread refreshes FPS and liveness independent of arrivals.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_channel::Receiver;
use contracts::{
    EngineConfig, Frame, FrameCallback, FrameContext, FrameEnvelope, FrameHandler, FrameOrigin,
    LatencySample, PlaybackTarget, RtlsConfig, SourceFrame, SystemType, TrackableType,
};
use postprocess::{Postprocessor, PostprocessorSnapshot};
use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

use crate::bus::{EventBus, DEFAULT_BUS_CAPACITY};
use crate::error::{DispatchError, DispatcherError};

/// Status of one source system
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceStatus {
    pub system: SystemType,
    /// Smoothed frames per second
    pub fps: f32,
    /// Data arrived within the stop gap
    pub receiving: bool,
    pub playback_active: bool,
    pub frames_received: u64,
    pub frames_dispatched: u64,
    pub frames_suppressed: u64,
}

#[derive(Debug, Default)]
struct ArrivalStats {
    arrivals: VecDeque<Instant>,
    last_arrival: Option<Instant>,
    fps: f64,
    receiving: bool,
    /// Per trackable type: last arrival and smoothed inter-frame interval
    intervals: HashMap<TrackableType, (Instant, Option<f64>)>,
}

impl ArrivalStats {
    /// Frame rate of one trackable type from its inter-frame intervals,
    /// seeded by the first interval so it is usable from the second frame.
    fn route_rate(&mut self, trackable_type: TrackableType, now: Instant, decay: f64) -> Option<f32> {
        let interval = match self.intervals.get(&trackable_type) {
            Some(&(last, smoothed)) => {
                let dt = now.saturating_duration_since(last).as_secs_f64();
                match smoothed {
                    Some(prev) => Some(prev * decay + dt * (1.0 - decay)),
                    None => Some(dt),
                }
            }
            None => None,
        };
        self.intervals.insert(trackable_type, (now, interval));
        interval
            .filter(|dt| *dt > 0.0)
            .map(|dt| (1.0 / dt) as f32)
    }
}

#[derive(Debug, Default)]
struct SystemState {
    sequence: AtomicU64,
    playback: AtomicBool,
    received: AtomicU64,
    dispatched: AtomicU64,
    suppressed: AtomicU64,
    stats: Mutex<ArrivalStats>,
}

struct EngineInner {
    config: EngineConfig,
    postprocess: bool,
    systems: BTreeMap<SystemType, SystemState>,
    postprocessors: HashMap<(SystemType, TrackableType), Postprocessor>,
    frames: EventBus<FrameEnvelope>,
    latency: EventBus<LatencySample>,
    latency_ema: Mutex<Option<f64>>,
    shutdown: AtomicBool,
    poll_lock: Mutex<()>,
    poll_wake: Condvar,
}

impl EngineInner {
    fn state(&self, system: SystemType) -> Option<&SystemState> {
        self.systems.get(&system)
    }

    fn dispatch(
        &self,
        system: SystemType,
        source_frame: SourceFrame,
        origin: FrameOrigin,
        output: &FrameHandler,
    ) -> Result<(), DispatchError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        let trackable_type = source_frame.trackable_type;
        if system == SystemType::Invalid || trackable_type == TrackableType::Invalid {
            return Err(DispatchError::InvalidRoute {
                system,
                trackable_type,
            });
        }
        let state = self
            .state(system)
            .ok_or(DispatchError::SystemDisabled { system })?;

        if origin == FrameOrigin::Live && state.playback.load(Ordering::Acquire) {
            state.suppressed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("rtls_frames_suppressed_total", "system" => system.as_str())
                .increment(1);
            return Err(DispatchError::Suppressed { system });
        }

        let postprocessor = if self.postprocess {
            let found = self.postprocessors.get(&(system, trackable_type)).ok_or(
                DispatchError::UnknownRoute {
                    system,
                    trackable_type,
                },
            )?;
            Some(found)
        } else {
            None
        };

        let received_at = Instant::now();
        state.received.fetch_add(1, Ordering::Relaxed);
        let measured_fps = self.record_arrival(state, trackable_type, received_at);

        let mut frame = source_frame.frame;
        frame.frame_id = state.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        frame.timestamp_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        frame.context = FrameContext::new(system, trackable_type).merge_into(&frame.context);

        let mut envelope = FrameEnvelope::new(system, trackable_type, frame)
            .with_origin(origin)
            .with_fps(source_frame.fps.or(measured_fps).unwrap_or(0.0));
        envelope.received_at = received_at;

        trace!(
            system = %system,
            trackable_type = %trackable_type,
            frame_id = envelope.frame.frame_id,
            trackables = envelope.frame.len(),
            origin = ?origin,
            "frame accepted"
        );

        let Some(postprocessor) = postprocessor else {
            self.publish(envelope, "passthrough");
            return Ok(());
        };
        if postprocessor.process_and_send(envelope, output.clone()) {
            Ok(())
        } else if postprocessor.is_running() {
            Err(DispatchError::Backlogged {
                system,
                trackable_type,
            })
        } else {
            Err(DispatchError::ShutDown)
        }
    }

    /// Returns the measured rate of the (system, trackable type) stream,
    /// `None` until two frames of it have arrived
    fn record_arrival(
        &self,
        state: &SystemState,
        trackable_type: TrackableType,
        now: Instant,
    ) -> Option<f32> {
        let mut stats = state.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.arrivals.push_back(now);
        stats.last_arrival = Some(now);
        stats.receiving = true;
        stats.route_rate(trackable_type, now, self.config.fps_decay)
    }

    fn publish(&self, envelope: FrameEnvelope, route: &'static str) {
        let system = envelope.system;
        let latency_ms = envelope.received_at.elapsed().as_secs_f64() * 1000.0;
        let smoothed_ms = {
            let mut ema = self.latency_ema.lock().unwrap_or_else(PoisonError::into_inner);
            let decay = self.config.latency_decay;
            let next = match *ema {
                Some(prev) => prev * decay + latency_ms * (1.0 - decay),
                None => latency_ms,
            };
            *ema = Some(next);
            next
        };
        metrics::histogram!("rtls_latency_ms").record(latency_ms);
        metrics::counter!("rtls_frames_dispatched_total", "route" => route).increment(1);

        if let Some(state) = self.state(system) {
            state.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        self.frames.publish(envelope);
        self.latency.publish(LatencySample {
            system,
            latency_ms,
            smoothed_ms,
        });
    }

    fn poll_tick(&self, now: Instant) {
        let window = Duration::from_millis(self.config.fps_window_ms);
        let stop_gap = Duration::from_millis(self.config.stop_gap_ms);
        let decay = self.config.fps_decay;

        for (system, state) in &self.systems {
            let mut stats = state.stats.lock().unwrap_or_else(PoisonError::into_inner);
            while let Some(front) = stats.arrivals.front() {
                if now.saturating_duration_since(*front) > window {
                    stats.arrivals.pop_front();
                } else {
                    break;
                }
            }
            let instant_fps = stats.arrivals.len() as f64 / window.as_secs_f64();
            stats.fps = stats.fps * decay + instant_fps * (1.0 - decay);

            let receiving = stats
                .last_arrival
                .is_some_and(|last| now.saturating_duration_since(last) < stop_gap);
            if receiving != stats.receiving {
                if receiving {
                    info!(system = %system, "source receiving");
                } else {
                    info!(system = %system, "source stopped receiving");
                }
            }
            stats.receiving = receiving;

            metrics::gauge!("rtls_source_fps", "system" => system.as_str()).set(stats.fps);
            metrics::gauge!("rtls_source_receiving", "system" => system.as_str())
                .set(if receiving { 1.0 } else { 0.0 });
        }
    }

    fn status(&self, system: SystemType, state: &SystemState) -> SourceStatus {
        let stats = state.stats.lock().unwrap_or_else(PoisonError::into_inner);
        SourceStatus {
            system,
            fps: stats.fps as f32,
            receiving: stats.receiving,
            playback_active: state.playback.load(Ordering::Acquire),
            frames_received: state.received.load(Ordering::Relaxed),
            frames_dispatched: state.dispatched.load(Ordering::Relaxed),
            frames_suppressed: state.suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Fusion / dispatch engine
pub struct FusionEngine {
    inner: Arc<EngineInner>,
    output: FrameHandler,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl FusionEngine {
    /// Build postprocessors for every enabled stream and start the poll
    /// thread.
    #[instrument(name = "fusion_engine_new", skip(config), fields(systems = ?config.systems))]
    pub fn new(config: &RtlsConfig) -> Result<Self, DispatcherError> {
        let systems = config
            .systems
            .iter()
            .map(|&system| (system, SystemState::default()))
            .collect();

        let mut postprocessors = HashMap::new();
        if config.postprocess {
            for pp_config in config.effective_postprocessors() {
                if !config.is_enabled(pp_config.system) {
                    warn!(
                        postprocessor = %pp_config.name,
                        system = %pp_config.system,
                        "postprocessor for disabled system skipped"
                    );
                    continue;
                }
                let pp = Postprocessor::new(&pp_config)?;
                postprocessors.insert((pp_config.system, pp_config.trackable_type), pp);
            }
        }

        let inner = Arc::new(EngineInner {
            config: config.engine.clone(),
            postprocess: config.postprocess,
            systems,
            postprocessors,
            frames: EventBus::new("frames", DEFAULT_BUS_CAPACITY),
            latency: EventBus::new("latency", DEFAULT_BUS_CAPACITY),
            latency_ema: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            poll_lock: Mutex::new(()),
            poll_wake: Condvar::new(),
        });

        let weak = Arc::downgrade(&inner);
        let output: FrameHandler = Arc::new(move |envelope: FrameEnvelope| {
            if let Some(inner) = weak.upgrade() {
                inner.publish(envelope, "postprocess");
            }
        });

        let poller = Self::spawn_poller(inner.clone())?;
        info!(
            systems = inner.systems.len(),
            postprocessors = inner.postprocessors.len(),
            postprocess = inner.postprocess,
            "fusion engine started"
        );

        Ok(Self {
            inner,
            output,
            poller: Mutex::new(Some(poller)),
        })
    }

    fn spawn_poller(inner: Arc<EngineInner>) -> Result<JoinHandle<()>, DispatcherError> {
        let period = Duration::from_millis(inner.config.poll_interval_ms);
        thread::Builder::new()
            .name("engine-poll".to_string())
            .spawn(move || {
                let mut guard = inner.poll_lock.lock().unwrap_or_else(PoisonError::into_inner);
                while !inner.shutdown.load(Ordering::Acquire) {
                    let (next, _) = inner
                        .poll_wake
                        .wait_timeout_while(guard, period, |_| {
                            !inner.shutdown.load(Ordering::Acquire)
                        })
                        .unwrap_or_else(PoisonError::into_inner);
                    guard = next;
                    if inner.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    inner.poll_tick(Instant::now());
                }
                debug!("engine poll thread stopped");
            })
            .map_err(DispatcherError::Spawn)
    }

    /// Dispatch a live frame from `system`
    pub fn dispatch(&self, system: SystemType, frame: SourceFrame) -> Result<(), DispatchError> {
        self.inner
            .dispatch(system, frame, FrameOrigin::Live, &self.output)
    }

    /// Dispatch a frame replayed from a take
    pub fn dispatch_playback(
        &self,
        system: SystemType,
        frame: SourceFrame,
    ) -> Result<(), DispatchError> {
        self.inner
            .dispatch(system, frame, FrameOrigin::Playback, &self.output)
    }

    /// Callback to hand to the tracking source of `system`
    pub fn source_callback(&self, system: SystemType) -> FrameCallback {
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let output = self.output.clone();
        Arc::new(move |frame: SourceFrame| {
            let Some(inner) = weak.upgrade() else { return };
            match inner.dispatch(system, frame, FrameOrigin::Live, &output) {
                Ok(()) | Err(DispatchError::Suppressed { .. }) => {}
                Err(DispatchError::ShutDown) => trace!(system = %system, "frame after shutdown"),
                Err(e) => warn!(system = %system, error = %e, "frame not dispatched"),
            }
        })
    }

    /// Processed frames, one receiver per consumer
    pub fn subscribe(&self) -> Receiver<FrameEnvelope> {
        self.inner.frames.subscribe()
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<FrameEnvelope> {
        self.inner.frames.subscribe_with_capacity(capacity)
    }

    /// Latency samples, one per published frame
    pub fn subscribe_latency(&self) -> Receiver<LatencySample> {
        self.inner.latency.subscribe()
    }

    /// Smoothed arrival-to-dispatch latency
    pub fn latency_ms(&self) -> Option<f64> {
        *self
            .inner
            .latency_ema
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source_status(&self, system: SystemType) -> Option<SourceStatus> {
        self.inner
            .state(system)
            .map(|state| self.inner.status(system, state))
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.inner
            .systems
            .iter()
            .map(|(system, state)| self.inner.status(*system, state))
            .collect()
    }

    pub fn is_receiving(&self, system: SystemType) -> bool {
        self.source_status(system).is_some_and(|s| s.receiving)
    }

    /// Suppress (or release) live frames of `system`.
    ///
    /// Returns `false` for a system that is not enabled.
    pub fn set_playback_active(&self, system: SystemType, active: bool) -> bool {
        let Some(state) = self.inner.state(system) else {
            return false;
        };
        let was = state.playback.swap(active, Ordering::AcqRel);
        if was != active {
            info!(system = %system, active, "playback arbitration changed");
        }
        true
    }

    pub fn is_playback_active(&self, system: SystemType) -> bool {
        self.inner
            .state(system)
            .is_some_and(|s| s.playback.load(Ordering::Acquire))
    }

    /// Queue a continuity/filter reset on one stream
    pub fn reset_postprocessor(&self, system: SystemType, trackable_type: TrackableType) -> bool {
        match self.inner.postprocessors.get(&(system, trackable_type)) {
            Some(pp) => pp.reset(),
            None => false,
        }
    }

    pub fn postprocessor_snapshots(&self) -> Vec<(String, PostprocessorSnapshot)> {
        let mut snapshots: Vec<_> = self
            .inner
            .postprocessors
            .values()
            .map(|pp| (pp.name().to_string(), pp.snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    /// Stop the poll thread and postprocessors and close both buses.
    ///
    /// Queued frames are not drained. Idempotent.
    #[instrument(name = "fusion_engine_shutdown", skip(self))]
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let _guard = self
                .inner
                .poll_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.poll_wake.notify_all();
        }
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = poller {
            if handle.join().is_err() {
                warn!("engine poll thread panicked");
            }
        }
        for pp in self.inner.postprocessors.values() {
            pp.shutdown();
        }
        self.inner.frames.close();
        self.inner.latency.close();
        info!("fusion engine stopped");
    }
}

impl Drop for FusionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PlaybackTarget for FusionEngine {
    fn playback_started(&self, system: SystemType) {
        self.set_playback_active(system, true);
    }

    fn playback_frame(
        &self,
        system: SystemType,
        trackable_type: TrackableType,
        fps: f32,
        frame: Frame,
    ) {
        let frame = SourceFrame {
            trackable_type,
            fps: Some(fps),
            frame,
        };
        if let Err(e) = self.dispatch_playback(system, frame) {
            debug!(system = %system, error = %e, "playback frame not dispatched");
        }
    }

    fn playback_looped(&self, system: SystemType, trackable_type: TrackableType) {
        debug!(system = %system, trackable_type = %trackable_type, "playback looped");
        self.reset_postprocessor(system, trackable_type);
    }

    fn playback_stopped(&self, system: SystemType) {
        self.set_playback_active(system, false);
        // Live data resumes after a discontinuity
        for trackable_type in TrackableType::ALL {
            self.reset_postprocessor(system, trackable_type);
        }
    }
}
