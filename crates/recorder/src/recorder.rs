//! Recorder - collects processed frames into takes and saves them
//!
//! Appending is cheap and happens on the caller's thread. Saving converts
//! the take into a container and writes it on a dedicated worker so the
//! producer never waits on disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{FrameEnvelope, RecorderConfig, SystemType, Worker};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{RecorderError, Result};
use crate::take::{tagged, Take};

/// Recording lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingEvent {
    Began { path: PathBuf },
    Ended { path: PathBuf, saved: bool },
}

#[derive(Debug, Default)]
struct SaveProgress {
    saving: AtomicBool,
    total: AtomicU64,
    saved: AtomicU64,
}

struct Session {
    take: Take,
    started_at: Instant,
}

/// Take recorder
pub struct Recorder {
    config: RecorderConfig,
    enabled: AtomicBool,
    recording: AtomicBool,
    session: Mutex<Option<Session>>,
    saver: Worker<Take>,
    queued: AtomicU64,
    progress: Arc<SaveProgress>,
    events: broadcast::Sender<RecordingEvent>,
}

impl Recorder {
    #[instrument(name = "recorder_new", skip(config), fields(folder = %config.take_folder.display()))]
    pub fn new(config: RecorderConfig) -> Result<Self> {
        let progress = Arc::new(SaveProgress::default());
        let (events, _) = broadcast::channel(16);

        let worker_progress = Arc::clone(&progress);
        let worker_events = events.clone();
        let saver = Worker::spawn("recorder-save", move |take: Take| {
            let path = take.path().to_path_buf();
            let saved = match save_take(take, &worker_progress) {
                Ok(()) => {
                    info!(path = %path.display(), "saved take");
                    metrics::counter!("rtls_recorder_takes_saved_total", "status" => "ok")
                        .increment(1);
                    true
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "could not save take");
                    metrics::counter!("rtls_recorder_takes_saved_total", "status" => "failed")
                        .increment(1);
                    false
                }
            };
            let _ = worker_events.send(RecordingEvent::Ended { path, saved });
        })?;

        Ok(Self {
            config,
            enabled: AtomicBool::new(true),
            recording: AtomicBool::new(false),
            session: Mutex::new(None),
            saver,
            queued: AtomicU64::new(0),
            progress,
            events,
        })
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// `<take_folder>/<take_prefix>_<timestamp>.c3d`
    pub fn generate_take_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S-%3f");
        self.config
            .take_folder
            .join(format!("{}_{}.c3d", self.config.take_prefix, stamp))
    }

    /// Begin a new take, at `path` or a generated path.
    #[instrument(name = "recorder_start", skip(self))]
    pub fn start_recording(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        if !self.is_enabled() {
            return Err(RecorderError::Disabled);
        }

        let mut session = self.session();
        if let Some(active) = session.as_ref() {
            return Err(RecorderError::AlreadyRecording {
                path: active.take.path().to_path_buf(),
            });
        }

        let path = path.unwrap_or_else(|| self.generate_take_path());
        *session = Some(Session {
            take: Take::new(path.clone()),
            started_at: Instant::now(),
        });
        self.recording.store(true, Ordering::Release);
        drop(session);

        info!(path = %path.display(), "recording started");
        let _ = self.events.send(RecordingEvent::Began { path: path.clone() });
        Ok(path)
    }

    /// Stop recording and hand the take to the save worker.
    ///
    /// `path` overrides where the take is written. Returns the target path.
    #[instrument(name = "recorder_stop", skip(self))]
    pub fn stop_recording(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let Some(mut session) = self.session().take() else {
            return Err(RecorderError::NotRecording);
        };
        self.recording.store(false, Ordering::Release);

        if let Some(path) = path {
            session.take.set_path(path);
        }
        session.take.finish();
        let target = session.take.path().to_path_buf();

        info!(
            path = %target.display(),
            frames = session.take.frame_count(),
            secs = session.started_at.elapsed().as_secs_f32(),
            "recording stopped, saving"
        );

        self.queued.fetch_add(1, Ordering::AcqRel);
        if !self.saver.push(session.take) {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            error!(path = %target.display(), "save worker is not running, take discarded");
            let _ = self.events.send(RecordingEvent::Ended {
                path: target.clone(),
                saved: false,
            });
        }
        Ok(target)
    }

    /// Flip recording on or off
    pub fn toggle_recording(&self) -> Result<PathBuf> {
        if self.is_recording() {
            self.stop_recording(None)
        } else {
            self.start_recording(None)
        }
    }

    /// Add one frame to the open tick of `system`
    pub fn add(&self, system: SystemType, fps: f32, frame: contracts::Frame) -> bool {
        if !self.is_enabled() || !self.is_recording() {
            return false;
        }
        let mut session = self.session();
        let Some(session) = session.as_mut() else {
            return false;
        };
        match session.take.add(system, fps, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(system = %system, error = %e, "frame not recorded");
                false
            }
        }
    }

    /// Close the open tick of `system`
    pub fn update(&self, system: SystemType) {
        if let Some(session) = self.session().as_mut() {
            session.take.update(system);
        }
    }

    /// Record a processed frame, closing the system's tick whenever a
    /// trackable type repeats.
    ///
    /// Frames whose rate is not known yet (a source without a declared
    /// rate, before its second frame) are skipped so they cannot lock the
    /// take to a wrong rate.
    pub fn record(&self, envelope: &FrameEnvelope) -> bool {
        if !self.is_enabled() || !self.is_recording() {
            return false;
        }
        if !envelope.fps.is_finite() || envelope.fps <= 0.0 {
            debug!(system = %envelope.system, "frame rate not known yet, frame not recorded");
            return false;
        }
        let frame = tagged(envelope.system, envelope.trackable_type, envelope.frame.clone());
        let mut session = self.session();
        let Some(session) = session.as_mut() else {
            return false;
        };
        match session.take.append(envelope.system, envelope.fps, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(system = %envelope.system, error = %e, "frame not recorded");
                false
            }
        }
    }

    /// Seconds since the current take started, 0 when idle
    pub fn recording_duration(&self) -> f32 {
        self.session()
            .as_ref()
            .map(|s| s.started_at.elapsed().as_secs_f32())
            .unwrap_or(0.0)
    }

    /// Path of the take being recorded
    pub fn current_path(&self) -> Option<PathBuf> {
        self.session().as_ref().map(|s| s.take.path().to_path_buf())
    }

    /// True while any handed-over take has not finished saving
    pub fn is_saving(&self) -> bool {
        let done = self.saver.processed() + self.saver.panicked();
        self.queued.load(Ordering::Acquire) > done
    }

    /// Fraction of the current save that is done, scaled so the final
    /// write to disk is the last 5%.
    pub fn saving_progress(&self) -> f32 {
        if !self.progress.saving.load(Ordering::Acquire) {
            return 0.0;
        }
        let total = self.progress.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.progress.saved.load(Ordering::Relaxed) as f32 / total as f32 * 0.95
    }

    /// Wait until queued saves are written, up to `timeout`
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_saving() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    pub fn status(&self) -> String {
        if !self.saver.is_running() {
            return "Recorder not setup".to_string();
        }
        if !self.is_enabled() {
            return "Recorder is DISABLED".to_string();
        }
        match self.session().as_ref() {
            None => "Recording OFF".to_string(),
            Some(s) => format!(
                "Recording to file {} [{:.2} sec]",
                s.take.path().display(),
                s.started_at.elapsed().as_secs_f32()
            ),
        }
    }

    /// Stop the save worker. Takes still queued are dropped.
    pub fn shutdown(&self) {
        self.saver.shutdown();
    }
}

fn save_take(take: Take, progress: &SaveProgress) -> Result<()> {
    if take.is_empty() {
        return Err(RecorderError::EmptyTake);
    }
    if !take.is_valid() {
        return Err(RecorderError::InvalidTake);
    }

    let path: PathBuf = take.path().to_path_buf();
    progress
        .total
        .store(take.frame_count() as u64, Ordering::Relaxed);
    progress.saved.store(0, Ordering::Relaxed);
    progress.saving.store(true, Ordering::Release);

    let result = take
        .into_container(|n| progress.saved.store(n as u64, Ordering::Relaxed))
        .and_then(|container| container.write(&path).map_err(RecorderError::from));

    progress.saving.store(false, Ordering::Release);
    result
}
