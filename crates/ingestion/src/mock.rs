//! Scripted mock source
//!
//! Replays a fixed list of frames at a fixed interval, or lets a test push
//! frames by hand with `emit`. Reports any system type, so it can stand in
//! for hardware sources in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{ContractError, FrameCallback, SourceFrame, SystemType, TrackingSource};
use tracing::debug;

/// Mock source configuration
#[derive(Debug, Clone)]
pub struct ScriptedSourceConfig {
    pub name: String,
    pub system: SystemType,
    /// Frames replayed by the producer thread, in order
    pub script: Vec<SourceFrame>,
    pub interval: Duration,
    /// Restart the script after the last frame
    pub repeat: bool,
}

impl Default for ScriptedSourceConfig {
    fn default() -> Self {
        Self {
            name: "scripted".to_string(),
            system: SystemType::Null,
            script: Vec::new(),
            interval: Duration::from_millis(10),
            repeat: false,
        }
    }
}

/// Deterministic mock source
pub struct ScriptedSource {
    config: ScriptedSourceConfig,
    running: Arc<AtomicBool>,
    callback: Mutex<Option<FrameCallback>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    emitted: Arc<AtomicU64>,
}

impl ScriptedSource {
    pub fn new(config: ScriptedSourceConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            callback: Mutex::new(None),
            handle: Mutex::new(None),
            emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Source that only emits what a test pushes through `emit`
    pub fn manual(name: &str, system: SystemType) -> Self {
        Self::new(ScriptedSourceConfig {
            name: name.to_string(),
            system,
            ..Default::default()
        })
    }

    /// Deliver `frame` right away on the caller's thread.
    ///
    /// Returns `false` if the source is not running.
    pub fn emit(&self, frame: SourceFrame) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback(frame);
                self.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Frames delivered so far (script and manual)
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl TrackingSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn system_type(&self) -> SystemType {
        self.config.system
    }

    fn start(&self, callback: FrameCallback) -> Result<(), ContractError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback.clone());

        if self.config.script.is_empty() {
            return Ok(());
        }

        let script = self.config.script.clone();
        let interval = self.config.interval;
        let repeat = self.config.repeat;
        let running = self.running.clone();
        let emitted = self.emitted.clone();
        let name = self.config.name.clone();

        let handle = thread::Builder::new()
            .name(format!("src-{name}"))
            .spawn(move || {
                'outer: loop {
                    for frame in &script {
                        if !running.load(Ordering::Relaxed) {
                            break 'outer;
                        }
                        callback(frame.clone());
                        emitted.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(interval);
                    }
                    if !repeat {
                        break;
                    }
                }
                debug!(source = %name, "script finished");
            })
            .map_err(|e| ContractError::source(&self.config.name, e.to_string()))?;
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Frame, Position, Trackable};
    use std::sync::mpsc;

    fn frame(id: u64) -> SourceFrame {
        SourceFrame::samples(Frame {
            frame_id: id,
            ..Frame::new(vec![Trackable::at(Position::default()).with_id(1)])
        })
    }

    #[test]
    fn test_script_plays_in_order() {
        let source = ScriptedSource::new(ScriptedSourceConfig {
            script: (1..=5).map(frame).collect(),
            interval: Duration::from_millis(1),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        source
            .start(Arc::new(move |f: SourceFrame| {
                let _ = tx.lock().unwrap().send(f.frame.frame_id);
            }))
            .unwrap();

        let got: Vec<u64> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
        source.stop();
        assert_eq!(source.emitted(), 5);
    }

    #[test]
    fn test_manual_emit_requires_running() {
        let source = ScriptedSource::manual("hand", SystemType::Motive);
        assert!(!source.emit(frame(1)));

        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        source
            .start(Arc::new(move |_: SourceFrame| {
                c.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        assert!(source.emit(frame(1)));
        assert!(source.emit(frame(2)));
        assert_eq!(count.load(Ordering::Relaxed), 2);

        source.stop();
        assert!(!source.emit(frame(3)));
        assert_eq!(source.system_type(), SystemType::Motive);
    }
}
