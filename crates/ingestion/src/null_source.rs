//! Synthetic tracking source
//!
//! Produces `count` moving trackables at a fixed rate without any hardware.
//! Used for demos, soak runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    ContractError, Frame, FrameCallback, MotionModel, NullSourceConfig, Orientation, Position,
    SourceFrame, SystemType, Trackable, TrackingSource,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

/// Spring constant of the elastic model, 1/s^2
const SPRING: f32 = 4.0;
/// Velocity damping of the elastic model, 1/s
const DAMPING: f32 = 1.5;
/// Observer ring radius and height, meters
const OBSERVER_RADIUS: f32 = 3.0;
const OBSERVER_HEIGHT: f32 = 2.5;

struct Body {
    anchor: Position,
    position: Position,
    velocity: [f32; 3],
    cuid: String,
}

/// Deterministic frame generator behind `NullSource`
pub struct NullGenerator {
    config: NullSourceConfig,
    rng: StdRng,
    bodies: Vec<Body>,
}

impl NullGenerator {
    pub fn new(config: NullSourceConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let bounds = config.bounds;
        let bodies = (0..config.count)
            .map(|_| {
                let anchor = Position::new(
                    rng.random_range(-bounds..=bounds),
                    rng.random_range(-bounds..=bounds),
                    rng.random_range(0.0..=bounds),
                );
                Body {
                    anchor,
                    position: anchor,
                    velocity: [0.0; 3],
                    cuid: format!("{:016x}", rng.random::<u64>()),
                }
            })
            .collect();
        Self {
            config,
            rng,
            bodies,
        }
    }

    /// Advance the simulation by `dt` seconds and build a sample frame
    pub fn next_frame(&mut self, dt: f32) -> Frame {
        let NullSourceConfig {
            motion,
            speed,
            bounds,
            presence_density,
            set_id,
            set_cuid,
            ..
        } = self.config;

        let mut trackables = Vec::with_capacity(self.bodies.len());
        for (i, body) in self.bodies.iter_mut().enumerate() {
            let mut p = body.position.to_array();
            match motion {
                MotionModel::Brownian => {
                    for v in p.iter_mut() {
                        *v += self.rng.random_range(-1.0f32..=1.0) * speed * dt;
                    }
                }
                MotionModel::Elastic => {
                    let anchor = body.anchor.to_array();
                    for axis in 0..3 {
                        let kick = self.rng.random_range(-1.0f32..=1.0) * speed;
                        let accel = (anchor[axis] - p[axis]) * SPRING
                            - body.velocity[axis] * DAMPING
                            + kick * SPRING;
                        body.velocity[axis] += accel * dt;
                        p[axis] += body.velocity[axis] * dt;
                    }
                }
            }
            p[0] = p[0].clamp(-bounds, bounds);
            p[1] = p[1].clamp(-bounds, bounds);
            p[2] = p[2].clamp(0.0, bounds);
            body.position = Position::from(p);

            if self.rng.random::<f32>() >= presence_density {
                continue;
            }
            let mut trackable = Trackable::at(body.position);
            if set_id {
                trackable.id = i as i64 + 1;
            }
            if set_cuid {
                trackable.cuid = body.cuid.clone();
            }
            trackables.push(trackable);
        }
        Frame::new(trackables)
    }

    /// Static ring of observers (cameras) looking at the origin
    pub fn observer_frame(&self) -> Frame {
        let n = self.config.observers;
        let trackables = (0..n)
            .map(|i| {
                let angle = i as f32 / n as f32 * std::f32::consts::TAU;
                let mut t = Trackable::at(Position::new(
                    OBSERVER_RADIUS * angle.cos(),
                    OBSERVER_RADIUS * angle.sin(),
                    OBSERVER_HEIGHT,
                ))
                .with_id(i as i64 + 1);
                let half = angle / 2.0;
                t.orientation = Some(Orientation {
                    w: half.cos(),
                    x: 0.0,
                    y: 0.0,
                    z: half.sin(),
                });
                t
            })
            .collect();
        Frame::new(trackables)
    }
}

/// Synthetic source running on its own producer thread
pub struct NullSource {
    name: String,
    config: NullSourceConfig,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NullSource {
    pub fn new(config: NullSourceConfig) -> Self {
        Self {
            name: "null".to_string(),
            config,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &NullSourceConfig {
        &self.config
    }
}

impl TrackingSource for NullSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn system_type(&self) -> SystemType {
        SystemType::Null
    }

    fn start(&self, callback: FrameCallback) -> Result<(), ContractError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config.clone();
        let running = self.running.clone();
        let name = self.name.clone();
        let period = Duration::from_secs_f32(1.0 / config.fps);

        let spawned = thread::Builder::new()
            .name(format!("src-{name}"))
            .spawn(move || {
                let mut generator = NullGenerator::new(config.clone());
                let dt = period.as_secs_f32();
                let mut next_tick = Instant::now();
                let mut ticks: u64 = 0;

                info!(source = %name, fps = config.fps, count = config.count, "null source started");
                while running.load(Ordering::Relaxed) {
                    let frame = generator.next_frame(dt);
                    trace!(source = %name, trackables = frame.len(), "null frame");
                    callback(SourceFrame::samples(frame).with_fps(config.fps));
                    if config.observers > 0 {
                        callback(SourceFrame::observers(generator.observer_frame()).with_fps(config.fps));
                    }
                    ticks += 1;

                    next_tick += period;
                    let now = Instant::now();
                    if next_tick > now {
                        thread::sleep(next_tick - now);
                    } else {
                        // Fell behind, do not try to catch up with a burst
                        next_tick = now;
                    }
                }
                debug!(source = %name, ticks, "null source stopped");
            });

        match spawned {
            Ok(handle) => {
                *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(ContractError::source(&self.name, e.to_string()))
            }
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(source = %self.name, "null source thread panicked");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for NullSource {
    fn drop(&mut self) {
        self.stop();
    }
}
