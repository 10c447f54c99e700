//! PlayerTake - a loaded take ready for playback
//!
//! Point labels are grouped back into per-(system, trackable type)
//! template frames using the description stored with each label. Each
//! playback tick fills the templates with that tick's positions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use contracts::{
    Frame, FrameContext, Position, SystemType, Trackable, TrackableKey, TrackableType,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::container::Container;
use crate::error::{RecorderError, Result};

/// Template for one (system, trackable type) stream
#[derive(Debug, Clone)]
pub struct TemplateFrame {
    pub system: SystemType,
    pub trackable_type: TrackableType,
    /// Trackable identities, without positions
    pub trackables: Vec<Trackable>,
    /// Container point index of each trackable
    pub points: Vec<usize>,
}

impl TemplateFrame {
    pub fn context(&self) -> FrameContext {
        FrameContext::new(self.system, self.trackable_type)
    }
}

/// A take loaded for playback
#[derive(Debug, Clone)]
pub struct PlayerTake {
    path: PathBuf,
    container: Container,
    templates: BTreeMap<(SystemType, TrackableType), TemplateFrame>,
}

impl PlayerTake {
    /// Load a `.c3d` take and rebuild its template frames
    #[instrument(name = "player_take_load", fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let is_c3d = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("c3d"));
        if !is_c3d {
            return Err(RecorderError::BadExtension {
                path: path.to_path_buf(),
            });
        }
        if !path.exists() {
            return Err(RecorderError::MissingTake {
                path: path.to_path_buf(),
            });
        }

        let container = Container::read(path)?;
        Self::from_container(path, container)
    }

    pub fn from_container(path: impl Into<PathBuf>, container: Container) -> Result<Self> {
        if !container.rate.is_finite() || container.rate <= 0.0 {
            return Err(RecorderError::InvalidFrameRate {
                fps: container.rate,
            });
        }
        let mut take = Self {
            path: path.into(),
            container,
            templates: BTreeMap::new(),
        };
        take.populate_template_frames()?;
        debug!(
            path = %take.path.display(),
            frames = take.frame_count(),
            templates = take.templates.len(),
            "take loaded"
        );
        Ok(take)
    }

    /// Group labels by the (system, type) in their description and
    /// rebuild each label's identity.
    pub fn populate_template_frames(&mut self) -> Result<()> {
        self.templates.clear();

        for (index, (label, description)) in self
            .container
            .labels
            .iter()
            .zip(&self.container.descriptions)
            .enumerate()
        {
            let desc: Value = serde_json::from_str(description)
                .map_err(|e| RecorderError::bad_description(label, e.to_string()))?;

            let context = desc
                .pointer("/frame/context")
                .and_then(FrameContext::from_value)
                .ok_or_else(|| RecorderError::bad_description(label, "missing frame.context.s/t"))?;
            let described = desc
                .get("trackable")
                .and_then(Value::as_object)
                .ok_or_else(|| RecorderError::bad_description(label, "missing trackable"))?;

            let mut trackable = Trackable::default();
            TrackableKey::from(label.as_str()).reconcile(&mut trackable);
            if let Some(id) = described.get("id").and_then(Value::as_i64) {
                trackable.id = id;
            }
            if let Some(cuid) = described.get("cuid").and_then(Value::as_str) {
                trackable.cuid = cuid.to_string();
            }
            if let Some(name) = described.get("name").and_then(Value::as_str) {
                trackable.name = name.to_string();
            }
            if let Some(ctx) = described.get("context") {
                trackable.context = ctx.to_string();
            }

            let template = self
                .templates
                .entry((context.system, context.trackable_type))
                .or_insert_with(|| TemplateFrame {
                    system: context.system,
                    trackable_type: context.trackable_type,
                    trackables: Vec::new(),
                    points: Vec::new(),
                });
            template.trackables.push(trackable);
            template.points.push(index);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fps(&self) -> f32 {
        self.container.rate
    }

    pub fn frame_count(&self) -> usize {
        self.container.frame_count()
    }

    pub fn duration_secs(&self) -> f32 {
        self.container.duration_secs()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateFrame> {
        self.templates.values()
    }

    /// Systems present in the take
    pub fn systems(&self) -> Vec<SystemType> {
        let mut systems: Vec<SystemType> = self.templates.keys().map(|(s, _)| *s).collect();
        systems.dedup();
        systems
    }

    /// Frames of tick `index`, one per template, in template order.
    ///
    /// Points stored as NaN are absent and left out; a template with no
    /// present points still yields an empty frame.
    pub fn frames_at(&self, index: usize) -> Vec<(SystemType, TrackableType, Frame)> {
        let Some(positions) = self.container.frames.get(index) else {
            return Vec::new();
        };

        self.templates
            .values()
            .map(|template| {
                let trackables = template
                    .trackables
                    .iter()
                    .zip(&template.points)
                    .filter_map(|(t, &point)| {
                        let position: Position = *positions.get(point)?;
                        if position.is_nan() {
                            return None;
                        }
                        let mut trackable = t.clone();
                        trackable.position = position;
                        Some(trackable)
                    })
                    .collect();

                let frame = Frame {
                    frame_id: index as u64,
                    timestamp_ms: 0,
                    context: template.context().to_value().to_string(),
                    trackables,
                };
                (template.system, template.trackable_type, frame)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take::{tagged, Take};
    use tempfile::tempdir;

    fn recorded_take() -> Container {
        let mut take = Take::new("t.c3d");
        for tick in 0..3 {
            let samples = Frame::new(vec![
                Trackable::at(Position::new(tick as f32, 0.0, 0.0)).with_id(4),
                Trackable {
                    context: r#"{"m":1}"#.into(),
                    ..Trackable::at(Position::new(0.0, tick as f32, 0.0)).with_cuid("c0ffee")
                },
            ]);
            let observers = if tick == 1 {
                Frame::default()
            } else {
                Frame::new(vec![
                    Trackable::at(Position::new(5.0, 5.0, 5.0)).with_name("cam"),
                ])
            };
            take.append(
                SystemType::Motive,
                120.0,
                tagged(SystemType::Motive, TrackableType::Sample, samples),
            )
            .unwrap();
            take.append(
                SystemType::Motive,
                120.0,
                tagged(SystemType::Motive, TrackableType::Observer, observers),
            )
            .unwrap();
        }
        take.finish();
        take.into_container(|_| {}).unwrap()
    }

    #[test]
    fn test_templates_restore_identity_and_context() {
        let take = PlayerTake::from_container("t.c3d", recorded_take()).unwrap();
        assert_eq!(take.fps(), 120.0);
        assert_eq!(take.frame_count(), 3);
        assert_eq!(take.systems(), vec![SystemType::Motive]);

        let frames = take.frames_at(0);
        assert_eq!(frames.len(), 2);
        let (system, trackable_type, samples) = &frames[0];
        assert_eq!(*system, SystemType::Motive);
        assert_eq!(*trackable_type, TrackableType::Sample);
        assert_eq!(samples.len(), 2);
        assert_eq!(
            samples.tag(),
            Some(FrameContext::new(SystemType::Motive, TrackableType::Sample))
        );

        let id = samples.trackables.iter().find(|t| t.id == 4).unwrap();
        assert_eq!(id.position, Position::new(0.0, 0.0, 0.0));
        let cuid = samples.trackables.iter().find(|t| t.cuid == "c0ffee").unwrap();
        assert_eq!(cuid.context, r#"{"m":1}"#);
    }

    #[test]
    fn test_absent_points_dropped_but_template_kept() {
        let take = PlayerTake::from_container("t.c3d", recorded_take()).unwrap();
        let frames = take.frames_at(1);
        assert_eq!(frames.len(), 2);
        let (_, trackable_type, observers) = &frames[1];
        assert_eq!(*trackable_type, TrackableType::Observer);
        assert!(observers.is_empty());
        assert!(take.frames_at(3).is_empty());
    }

    #[test]
    fn test_description_without_context_fails() {
        let mut container = recorded_take();
        container.descriptions[0] = r#"{"trackable":{}}"#.into();
        let err = PlayerTake::from_container("t.c3d", container).unwrap_err();
        assert!(matches!(err, RecorderError::BadDescription { .. }));
    }

    #[test]
    fn test_unusable_rate_rejected() {
        for rate in [f32::NAN, 0.0, -30.0, f32::INFINITY] {
            let mut container = recorded_take();
            container.rate = rate;
            let err = PlayerTake::from_container("t.c3d", container).unwrap_err();
            assert!(
                matches!(err, RecorderError::InvalidFrameRate { .. }),
                "rate {rate} accepted"
            );
        }
    }

    #[test]
    fn test_load_rejects_bad_rate_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nan.c3d");
        let mut container = recorded_take();
        container.rate = f32::NAN;
        container.write(&path).unwrap();
        assert!(matches!(
            PlayerTake::load(&path),
            Err(RecorderError::InvalidFrameRate { .. })
        ));
    }

    #[test]
    fn test_load_checks_extension_and_existence() {
        let dir = tempdir().unwrap();
        let wrong = dir.path().join("take.txt");
        assert!(matches!(
            PlayerTake::load(&wrong),
            Err(RecorderError::BadExtension { .. })
        ));
        let missing = dir.path().join("missing.c3d");
        assert!(matches!(
            PlayerTake::load(&missing),
            Err(RecorderError::MissingTake { .. })
        ));

        let path = dir.path().join("ok.C3D");
        recorded_take().write(&path).unwrap();
        assert_eq!(PlayerTake::load(&path).unwrap().frame_count(), 3);
    }
}
