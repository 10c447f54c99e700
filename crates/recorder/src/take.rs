//! Take - frames collected during one recording session
//!
//! Frames are grouped per source system into ticks. A tick holds every
//! frame one system produced for one instant (e.g. samples and observers).
//! The point-label set must be complete before anything is written, so
//! labels and their descriptions are collected as ticks close.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use contracts::{Frame, FrameContext, Position, SystemType, TrackableKey, TrackableType};
use serde_json::{Map, Value};
use tracing::warn;

use crate::container::{Container, Parameter};
use crate::error::{RecorderError, Result};

/// Frame rates closer than this are considered equal
pub const FPS_TOLERANCE: f32 = 0.001;

#[derive(Debug, Default)]
struct SystemTrack {
    ticks: VecDeque<Vec<Frame>>,
    pending: Vec<(TrackableType, Frame)>,
}

impl SystemTrack {
    fn has_pending(&self, trackable_type: TrackableType) -> bool {
        self.pending.iter().any(|(t, _)| *t == trackable_type)
    }
}

/// One recording session
#[derive(Debug)]
pub struct Take {
    path: PathBuf,
    fps: Option<f32>,
    started_at: Option<Instant>,
    systems: BTreeMap<SystemType, SystemTrack>,
    labels: BTreeSet<String>,
    descriptions: HashMap<String, String>,
}

impl Take {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fps: None,
            started_at: None,
            systems: BTreeMap::new(),
            labels: BTreeSet::new(),
            descriptions: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    /// Locked frame rate, set by the first accepted system
    pub fn fps(&self) -> Option<f32> {
        self.fps
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn systems(&self) -> impl Iterator<Item = SystemType> + '_ {
        self.systems.keys().copied()
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Queue a frame for the current tick of `system`.
    ///
    /// The first system fixes the take's frame rate; a system whose rate
    /// differs is rejected.
    pub fn add(&mut self, system: SystemType, fps: f32, frame: Frame) -> Result<()> {
        if fps.is_nan() || fps <= 0.0 {
            return Err(RecorderError::InvalidFrameRate { fps });
        }

        if !self.systems.contains_key(&system) {
            match self.fps {
                None => self.fps = Some(fps),
                Some(take_fps) if (take_fps - fps).abs() > FPS_TOLERANCE => {
                    return Err(RecorderError::FrameRateMismatch {
                        system,
                        fps,
                        take_fps,
                    });
                }
                Some(_) => {}
            }
            self.systems.insert(system, SystemTrack::default());
        }

        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }

        let trackable_type = frame
            .tag()
            .map(|c| c.trackable_type)
            .unwrap_or(TrackableType::Invalid);
        if let Some(track) = self.systems.get_mut(&system) {
            track.pending.push((trackable_type, frame));
        }
        Ok(())
    }

    /// Add a frame, first closing the current tick if it already holds a
    /// frame of the same trackable type.
    pub fn append(&mut self, system: SystemType, fps: f32, frame: Frame) -> Result<()> {
        let trackable_type = frame.tag().map(|c| c.trackable_type);
        let tick_full = match (self.systems.get(&system), trackable_type) {
            (Some(track), Some(t)) => track.has_pending(t),
            _ => false,
        };
        if tick_full {
            self.update(system);
        }
        self.add(system, fps, frame)
    }

    /// Close the current tick of `system`, collecting new point labels.
    pub fn update(&mut self, system: SystemType) {
        let Some(track) = self.systems.get_mut(&system) else {
            return;
        };
        if track.pending.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut track.pending);
        let mut tick = Vec::with_capacity(pending.len());
        for (_, frame) in pending {
            for trackable in &frame.trackables {
                let key = TrackableKey::derive(trackable);
                if self.labels.insert(key.as_str().to_string()) {
                    self.descriptions
                        .insert(key.as_str().to_string(), describe(&frame, trackable));
                }
            }
            tick.push(frame);
        }
        track.ticks.push_back(tick);
    }

    /// Close the open tick of every system
    pub fn finish(&mut self) {
        let systems: Vec<SystemType> = self.systems.keys().copied().collect();
        for system in systems {
            self.update(system);
        }
    }

    /// Number of output frames: the longest system track
    pub fn frame_count(&self) -> usize {
        self.systems
            .values()
            .map(|t| t.ticks.len())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.systems.values().all(|t| t.ticks.is_empty())
    }

    pub fn is_valid(&self) -> bool {
        self.fps.is_some_and(|f| f > 0.0)
    }

    /// Convert into a container, consuming the recorded ticks.
    ///
    /// `progress` is called with the number of frames converted so far.
    pub fn into_container(mut self, mut progress: impl FnMut(usize)) -> Result<Container> {
        if self.is_empty() {
            return Err(RecorderError::EmptyTake);
        }
        let Some(rate) = self.fps.filter(|f| *f > 0.0) else {
            return Err(RecorderError::InvalidTake);
        };

        let mut container = Container::new(rate);
        container.labels = self.labels.iter().cloned().collect();
        container.descriptions = container
            .labels
            .iter()
            .map(|l| self.descriptions.remove(l).unwrap_or_default())
            .collect();
        container.parameters = manufacturer_parameters();

        let index: HashMap<&str, usize> = container
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let points = container.labels.len();
        let nan = Position::new(f32::NAN, f32::NAN, f32::NAN);

        let mut frames = Vec::with_capacity(self.frame_count());
        while !self.is_empty() {
            let mut positions = vec![nan; points];
            for track in self.systems.values_mut() {
                let Some(tick) = track.ticks.pop_front() else {
                    continue;
                };
                for frame in &tick {
                    for trackable in &frame.trackables {
                        let key = TrackableKey::derive(trackable);
                        match index.get(key.as_str()) {
                            Some(&i) => positions[i] = trackable.position,
                            None => warn!(key = %key, "trackable without a point label"),
                        }
                    }
                }
            }
            frames.push(positions);
            progress(frames.len());
        }
        container.frames = frames;

        Ok(container)
    }
}

/// Point description: the frame tag plus the trackable's identity and
/// parsed context.
fn describe(frame: &Frame, trackable: &contracts::Trackable) -> String {
    let mut frame_context = Map::new();
    if let Ok(Value::Object(ctx)) = serde_json::from_str::<Value>(&frame.context) {
        for field in ["s", "t"] {
            if let Some(v) = ctx.get(field) {
                frame_context.insert(field.to_string(), v.clone());
            }
        }
    }

    let mut described = Map::new();
    if let Ok(ctx) = serde_json::from_str::<Value>(&trackable.context) {
        if !ctx.is_null() && ctx != Value::Object(Map::new()) {
            described.insert("context".into(), ctx);
        }
    }
    if !trackable.name.is_empty() {
        described.insert("name".into(), Value::from(trackable.name.clone()));
    }
    if !trackable.cuid.is_empty() {
        described.insert("cuid".into(), Value::from(trackable.cuid.clone()));
    }
    if trackable.id != 0 {
        described.insert("id".into(), Value::from(trackable.id));
    }

    let mut frame_desc = Map::new();
    frame_desc.insert("context".into(), Value::Object(frame_context));

    let mut root = Map::new();
    root.insert("frame".into(), Value::Object(frame_desc));
    root.insert("trackable".into(), Value::Object(described));
    Value::Object(root).to_string()
}

fn manufacturer_parameters() -> Vec<Parameter> {
    vec![
        Parameter::new("MANUFACTURER", "COMPANY", "rtls"),
        Parameter::new("MANUFACTURER", "SOFTWARE", "rtls-server"),
        Parameter::new(
            "MANUFACTURER",
            "SOFTWARE_DESCRIPTION",
            "Real Time Location System Server",
        ),
        Parameter::new("MANUFACTURER", "VERSION_LABEL", env!("CARGO_PKG_VERSION")),
    ]
}

/// Tag a frame with its (system, trackable type) context
pub fn tagged(system: SystemType, trackable_type: TrackableType, mut frame: Frame) -> Frame {
    frame.context = FrameContext::new(system, trackable_type).merge_into(&frame.context);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Trackable;

    fn frame(t: TrackableType, points: &[(i64, f32)]) -> Frame {
        let trackables = points
            .iter()
            .map(|(id, x)| Trackable::at(Position::new(*x, 0.0, 1.0)).with_id(*id))
            .collect();
        tagged(SystemType::Null, t, Frame::new(trackables))
    }

    #[test]
    fn test_frame_rate_lock() {
        let mut take = Take::new("t.c3d");
        take.add(SystemType::Null, 30.0, frame(TrackableType::Sample, &[(1, 0.0)]))
            .unwrap();
        // the rate is checked when a system first joins
        take.add(SystemType::Null, 60.0, frame(TrackableType::Sample, &[(1, 0.0)]))
            .unwrap();

        let err = take
            .add(SystemType::Motive, 60.0, Frame::default())
            .unwrap_err();
        assert!(matches!(err, RecorderError::FrameRateMismatch { .. }));
        take.add(SystemType::Motive, 30.0005, Frame::default()).unwrap();

        assert!(matches!(
            take.add(SystemType::OpenVr, 0.0, Frame::default()),
            Err(RecorderError::InvalidFrameRate { .. })
        ));
    }

    #[test]
    fn test_append_closes_tick_on_repeated_type() {
        let mut take = Take::new("t.c3d");
        take.append(SystemType::Null, 30.0, frame(TrackableType::Sample, &[(1, 0.0)]))
            .unwrap();
        take.append(SystemType::Null, 30.0, frame(TrackableType::Observer, &[(9, 0.0)]))
            .unwrap();
        take.append(SystemType::Null, 30.0, frame(TrackableType::Sample, &[(1, 1.0)]))
            .unwrap();
        take.finish();

        assert_eq!(take.frame_count(), 2);
        assert_eq!(take.labels().len(), 2);
    }

    #[test]
    fn test_container_uses_nan_for_absent_points() {
        let mut take = Take::new("t.c3d");
        take.append(SystemType::Null, 30.0, frame(TrackableType::Sample, &[(1, 0.5), (2, 1.5)]))
            .unwrap();
        take.append(SystemType::Null, 30.0, frame(TrackableType::Sample, &[(2, 2.5)]))
            .unwrap();
        take.finish();

        let mut progress = Vec::new();
        let container = take.into_container(|n| progress.push(n)).unwrap();
        assert_eq!(progress, vec![1, 2]);
        assert_eq!(container.labels, vec!["11", "12"]);
        assert_eq!(container.frames[0][0].x, 0.5);
        assert!(container.frames[1][0].is_nan());
        assert_eq!(container.frames[1][1].x, 2.5);
        assert_eq!(container.parameter("MANUFACTURER", "SOFTWARE"), Some("rtls-server"));

        let desc: Value = serde_json::from_str(&container.descriptions[1]).unwrap();
        assert_eq!(desc["frame"]["context"]["s"], Value::from(0));
        assert_eq!(desc["frame"]["context"]["t"], Value::from(0));
        assert_eq!(desc["trackable"]["id"], Value::from(2));
    }

    #[test]
    fn test_empty_and_invalid_takes_rejected() {
        let take = Take::new("t.c3d");
        assert!(matches!(take.into_container(|_| {}), Err(RecorderError::EmptyTake)));
    }
}
