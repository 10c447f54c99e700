//! Per-key filter chains
//!
//! A `FilterGroup` owns one `Filter` per trackable key. Each filter runs
//! its samples through an ordered list of `FilterStage`s built from
//! configuration.

mod group;
mod kalman;
mod stages;

pub use group::{Filter, FilterGroup};
pub use kalman::KalmanStage;
pub use stages::{AgeGate, AxisRemap, ContinuityGate, Easing, RateLimit};

use contracts::{parse_axis, FilterStageConfig};
use nalgebra::Vector3;

/// One smoothing or gating step.
///
/// `process` is called exactly once per tick: with `Some` when the key had
/// data, with `None` when it did not (or an earlier stage dropped it).
pub trait FilterStage: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>>;

    /// Whether the stage currently considers the output trustworthy
    fn is_valid(&self) -> bool {
        true
    }
}

/// Instantiate a stage from configuration
pub fn build_stage(config: &FilterStageConfig) -> Box<dyn FilterStage> {
    match config {
        FilterStageConfig::AgeGate {
            min_samples,
            max_missing,
        } => Box::new(AgeGate::new(*min_samples, *max_missing)),
        FilterStageConfig::AxisRemap { axes, scale } => {
            let mut parsed = [(0, 1.0), (1, 1.0), (2, 1.0)];
            for (slot, text) in parsed.iter_mut().zip(axes.iter()) {
                // Validated at load time; keep identity on a bad entry
                if let Some(axis) = parse_axis(text) {
                    *slot = axis;
                }
            }
            Box::new(AxisRemap::new(parsed, *scale))
        }
        FilterStageConfig::Kalman {
            process_noise,
            measurement_noise,
        } => Box::new(KalmanStage::new(*process_noise, *measurement_noise)),
        FilterStageConfig::Easing { factor } => Box::new(Easing::new(*factor)),
        FilterStageConfig::RateLimit { max_step } => Box::new(RateLimit::new(*max_step)),
        FilterStageConfig::ContinuityGate {
            max_jump,
            max_rejections,
        } => Box::new(ContinuityGate::new(*max_jump, *max_rejections)),
    }
}
