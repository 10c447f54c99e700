//! Player - replays a loaded take into a playback target
//!
//! Playback runs on its own thread. A resampler maps elapsed wall time to
//! a take frame index at `fps * speed`; every frame up to that index is
//! emitted in order. On loop the target is told so that continuity state
//! from the end of the take does not leak into its beginning.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{PlaybackConfig, PlaybackTarget};
use tracing::{debug, info, instrument, warn};

use crate::error::{RecorderError, Result};
use crate::player_take::PlayerTake;

/// Maps elapsed time to a frame index
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    rate: f64,
}

impl Resampler {
    pub fn new(fps: f32, speed: f32) -> Self {
        Self {
            rate: f64::from(fps) * f64::from(speed),
        }
    }

    /// False for zero, negative or non-finite rates, which cannot pace playback
    pub fn is_usable(&self) -> bool {
        self.rate.is_finite() && self.rate > 0.0
    }

    /// Index of the frame due at `elapsed`
    pub fn index_at(&self, elapsed: Duration) -> usize {
        if !self.is_usable() {
            return 0;
        }
        (elapsed.as_secs_f64() * self.rate).floor() as usize
    }

    /// Time at which frame `index` is due
    pub fn due_at(&self, index: usize) -> Duration {
        if !self.is_usable() {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(index as f64 / self.rate).unwrap_or(Duration::MAX)
    }
}

/// Clears `playing` when the playback thread exits, unwinding included
struct PlayingGuard<'a>(&'a AtomicBool);

impl Drop for PlayingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Control {
    stop: bool,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    playing: AtomicBool,
    loops: AtomicU64,
    frames_emitted: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`; true if a stop was requested
    fn wait_stop(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |c| !c.stop)
            .unwrap_or_else(PoisonError::into_inner);
        guard.stop
    }
}

/// Take player
pub struct Player {
    config: Mutex<PlaybackConfig>,
    target: Arc<dyn PlaybackTarget>,
    take: Mutex<Option<Arc<PlayerTake>>>,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new(config: PlaybackConfig, target: Arc<dyn PlaybackTarget>) -> Self {
        Self {
            config: Mutex::new(config),
            target,
            take: Mutex::new(None),
            shared: Arc::new(Shared {
                control: Mutex::new(Control::default()),
                wake: Condvar::new(),
                playing: AtomicBool::new(false),
                loops: AtomicU64::new(0),
                frames_emitted: AtomicU64::new(0),
            }),
            thread: Mutex::new(None),
        }
    }

    fn loaded(&self) -> Option<Arc<PlayerTake>> {
        self.take
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load a take, replacing the current one. Stops active playback.
    #[instrument(name = "player_load", skip(self), fields(path = %path.display()))]
    pub fn load(&self, path: &Path) -> Result<()> {
        let take = PlayerTake::load(path)?;
        self.stop();
        info!(
            path = %path.display(),
            frames = take.frame_count(),
            fps = take.fps(),
            "loaded take"
        );
        *self.take.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(take));
        Ok(())
    }

    /// Load `path` only when nothing is loaded yet
    pub fn offer(&self, path: &Path) -> bool {
        if self.loaded().is_some() || self.is_playing() {
            return false;
        }
        match self.load(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load take");
                false
            }
        }
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.loaded().map(|t| t.path().to_path_buf())
    }

    pub fn set_looping(&self, looping: bool) {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loop_playback = looping;
    }

    pub fn set_speed(&self, speed: f32) {
        if speed > 0.0 {
            self.config
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .speed = speed;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    pub fn fps(&self) -> Option<f32> {
        self.loaded().map(|t| t.fps())
    }

    pub fn frame_count(&self) -> usize {
        self.loaded().map(|t| t.frame_count()).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f32 {
        self.loaded().map(|t| t.duration_secs()).unwrap_or(0.0)
    }

    pub fn loops(&self) -> u64 {
        self.shared.loops.load(Ordering::Relaxed)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.shared.frames_emitted.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> String {
        match (self.loaded(), self.is_playing()) {
            (None, _) => "No take loaded".to_string(),
            (Some(take), false) => format!("Stopped: {}", take.path().display()),
            (Some(take), true) => format!(
                "Playing {} [{} frames @ {:.1} fps]",
                take.path().display(),
                take.frame_count(),
                take.fps()
            ),
        }
    }

    /// Start playback of the loaded take
    #[instrument(name = "player_play", skip(self))]
    pub fn play(&self) -> Result<()> {
        let take = self.loaded().ok_or(RecorderError::NothingLoaded)?;
        self.stop();

        let config = self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.shared.lock().stop = false;
        self.shared.playing.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let target = Arc::clone(&self.target);
        let handle = thread::Builder::new()
            .name("player".into())
            .spawn(move || {
                let _playing = PlayingGuard(&shared.playing);
                run_playback(&take, &config, target.as_ref(), &shared);
            })
            .map_err(|e| {
                self.shared.playing.store(false, Ordering::Release);
                RecorderError::Spawn(e)
            })?;

        *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Stop playback and wait for the playback thread
    pub fn stop(&self) {
        {
            let mut control = self.shared.lock();
            control.stop = true;
        }
        self.shared.wake.notify_all();

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("player thread panicked");
            }
        }
    }

    /// Block until a non-looping playback finishes, up to `timeout`
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_playing() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_playback(
    take: &PlayerTake,
    config: &PlaybackConfig,
    target: &dyn PlaybackTarget,
    shared: &Shared,
) {
    let systems = take.systems();
    for &system in &systems {
        target.playback_started(system);
    }

    let resampler = Resampler::new(take.fps(), config.speed);
    let frame_count = take.frame_count();
    let fps = take.fps();
    debug!(frames = frame_count, fps, speed = config.speed, "playback started");
    if !resampler.is_usable() {
        warn!(fps, speed = config.speed, "playback rate unusable, not playing");
        for &system in &systems {
            target.playback_stopped(system);
        }
        return;
    }

    let mut start = Instant::now();
    let mut next = 0usize;
    'playback: loop {
        if frame_count == 0 {
            break;
        }

        let due = resampler.index_at(start.elapsed()).min(frame_count - 1);
        while next <= due {
            for (system, trackable_type, frame) in take.frames_at(next) {
                target.playback_frame(system, trackable_type, fps, frame);
            }
            shared.frames_emitted.fetch_add(1, Ordering::Relaxed);
            next += 1;
        }

        if next >= frame_count {
            if !config.loop_playback {
                break;
            }
            for template in take.templates() {
                target.playback_looped(template.system, template.trackable_type);
            }
            shared.loops.fetch_add(1, Ordering::Relaxed);
            debug!(loops = shared.loops.load(Ordering::Relaxed), "playback looped");
            // one frame period between the last frame and the restart
            if shared.wait_stop(resampler.due_at(1)) {
                break 'playback;
            }
            start = Instant::now();
            next = 0;
            continue;
        }

        let wait = resampler.due_at(next).saturating_sub(start.elapsed());
        if shared.wait_stop(wait) {
            break;
        }
    }

    for &system in &systems {
        target.playback_stopped(system);
    }
    debug!("playback stopped");
}
