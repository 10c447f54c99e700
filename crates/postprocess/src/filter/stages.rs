//! Simple filter stages

use nalgebra::Vector3;

use super::FilterStage;

/// Validity gate: needs `min_samples` samples before it is valid and
/// turns invalid after `max_missing` consecutive ticks without data.
#[derive(Debug, Clone)]
pub struct AgeGate {
    min_samples: u32,
    max_missing: u32,
    seen: u32,
    missing: u32,
}

impl AgeGate {
    pub fn new(min_samples: u32, max_missing: u32) -> Self {
        Self {
            min_samples,
            max_missing,
            seen: 0,
            missing: 0,
        }
    }
}

impl FilterStage for AgeGate {
    fn name(&self) -> &'static str {
        "age_gate"
    }

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
        if input.is_some() {
            self.seen = self.seen.saturating_add(1);
            self.missing = 0;
        } else {
            self.missing = self.missing.saturating_add(1);
        }
        input
    }

    fn is_valid(&self) -> bool {
        self.seen >= self.min_samples && self.missing < self.max_missing
    }
}

/// Signed axis permutation plus uniform scale
#[derive(Debug, Clone)]
pub struct AxisRemap {
    axes: [(usize, f32); 3],
    scale: f32,
}

impl AxisRemap {
    /// `axes[i]` is (source axis index, sign) for output axis `i`
    pub fn new(axes: [(usize, f32); 3], scale: f32) -> Self {
        Self { axes, scale }
    }
}

impl FilterStage for AxisRemap {
    fn name(&self) -> &'static str {
        "axis_remap"
    }

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
        let p = input?;
        let pick = |(axis, sign): (usize, f32)| p[axis] * sign * self.scale;
        Some(Vector3::new(
            pick(self.axes[0]),
            pick(self.axes[1]),
            pick(self.axes[2]),
        ))
    }
}

/// Exponential approach towards the input
#[derive(Debug, Clone)]
pub struct Easing {
    factor: f32,
    current: Option<Vector3<f32>>,
}

impl Easing {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(f32::EPSILON, 1.0),
            current: None,
        }
    }
}

impl FilterStage for Easing {
    fn name(&self) -> &'static str {
        "easing"
    }

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
        let target = input?;
        let next = match self.current {
            Some(current) => current + (target - current) * self.factor,
            None => target,
        };
        self.current = Some(next);
        Some(next)
    }
}

/// Clamp per-tick displacement to `max_step`
#[derive(Debug, Clone)]
pub struct RateLimit {
    max_step: f32,
    last: Option<Vector3<f32>>,
}

impl RateLimit {
    pub fn new(max_step: f32) -> Self {
        Self {
            max_step,
            last: None,
        }
    }
}

impl FilterStage for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
        let target = input?;
        let next = match self.last {
            Some(last) => {
                let step = target - last;
                let len = step.norm();
                if len > self.max_step {
                    last + step * (self.max_step / len)
                } else {
                    target
                }
            }
            None => target,
        };
        self.last = Some(next);
        Some(next)
    }
}

/// Rejects single-tick jumps longer than `max_jump`.
///
/// A rejected sample is turned into a miss. After `max_rejections`
/// consecutive rejections the new position is accepted.
#[derive(Debug, Clone)]
pub struct ContinuityGate {
    max_jump: f32,
    max_rejections: u32,
    last: Option<Vector3<f32>>,
    rejections: u32,
}

impl ContinuityGate {
    pub fn new(max_jump: f32, max_rejections: u32) -> Self {
        Self {
            max_jump,
            max_rejections,
            last: None,
            rejections: 0,
        }
    }
}

impl FilterStage for ContinuityGate {
    fn name(&self) -> &'static str {
        "continuity_gate"
    }

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
        let p = input?;
        if let Some(last) = self.last {
            if (p - last).norm() > self.max_jump && self.rejections < self.max_rejections {
                self.rejections += 1;
                return None;
            }
        }
        self.rejections = 0;
        self.last = Some(p);
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32) -> Option<Vector3<f32>> {
        Some(Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_age_gate_lifecycle() {
        let mut gate = AgeGate::new(2, 3);
        gate.process(v(0.0));
        assert!(!gate.is_valid());
        gate.process(v(0.0));
        assert!(gate.is_valid());
        gate.process(None);
        gate.process(None);
        assert!(gate.is_valid());
        gate.process(None);
        assert!(!gate.is_valid());
        gate.process(v(0.0));
        assert!(gate.is_valid());
    }

    #[test]
    fn test_axis_remap() {
        let mut remap = AxisRemap::new([(0, 1.0), (2, -1.0), (1, 1.0)], 2.0);
        let out = remap.process(Some(Vector3::new(1.0, 2.0, 3.0))).unwrap();
        assert_eq!(out, Vector3::new(2.0, -6.0, 4.0));
        assert_eq!(remap.process(None), None);
    }

    #[test]
    fn test_easing_halves_distance() {
        let mut easing = Easing::new(0.5);
        assert_eq!(easing.process(v(0.0)), v(0.0));
        assert_eq!(easing.process(v(1.0)), v(0.5));
        assert_eq!(easing.process(v(1.0)), v(0.75));
    }

    #[test]
    fn test_rate_limit_clamps_step() {
        let mut limit = RateLimit::new(0.1);
        limit.process(v(0.0));
        let out = limit.process(v(1.0)).unwrap();
        assert!((out.x - 0.1).abs() < 1e-6);
        let out = limit.process(v(0.15)).unwrap();
        assert!((out.x - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_continuity_gate_rejects_then_accepts() {
        let mut gate = ContinuityGate::new(0.5, 2);
        assert_eq!(gate.process(v(0.0)), v(0.0));
        assert_eq!(gate.process(v(2.0)), None);
        assert_eq!(gate.process(v(2.0)), None);
        assert_eq!(gate.process(v(2.0)), v(2.0));
        assert_eq!(gate.process(v(2.1)), v(2.1));
    }
}
