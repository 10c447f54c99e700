//! Constant-velocity Kalman smoothing for 3D positions.
//!
//! Each axis runs an independent 2-state (position + velocity) filter with
//! a fixed one-tick time step, so velocity is in meters per tick.

use nalgebra::Vector3;

use super::FilterStage;

/// Transition matrix F = [[1, 1], [0, 1]]
/// Observation matrix H = [1, 0]
#[derive(Debug, Clone)]
struct Axis {
    /// Current state estimate (position, velocity)
    state: [f32; 2],
    /// State covariance matrix
    covariance: [[f32; 2]; 2],
}

impl Axis {
    fn new(position: f32, measurement_noise: f32) -> Self {
        Self {
            state: [position, 0.0],
            covariance: [[measurement_noise, 0.0], [0.0, 1.0]],
        }
    }

    fn predict(&mut self, q: f32) {
        let p00 = self.covariance[0][0];
        let p01 = self.covariance[0][1];
        let p11 = self.covariance[1][1];

        self.state = [self.state[0] + self.state[1], self.state[1]];
        self.covariance = [
            [p00 + 2.0 * p01 + p11 + q, p01 + p11],
            [p01 + p11, p11 + q * 0.1],
        ];
    }

    fn update(&mut self, observation: f32, r: f32) {
        let p00 = self.covariance[0][0];
        let p01 = self.covariance[0][1];
        let p11 = self.covariance[1][1];

        let residual = observation - self.state[0];
        let s = p00 + r;
        let k0 = p00 / s;
        let k1 = p01 / s;

        self.state = [self.state[0] + k0 * residual, self.state[1] + k1 * residual];
        self.covariance = [
            [((1.0 - k0) * p00).max(0.0), (1.0 - k0) * p01],
            [(1.0 - k0) * p01, (p11 - k1 * p01).max(0.0)],
        ];
    }
}

/// Kalman stage; coasts on predicted velocity through missing ticks
#[derive(Debug, Clone)]
pub struct KalmanStage {
    process_noise: f32,
    measurement_noise: f32,
    axes: Option<[Axis; 3]>,
}

impl KalmanStage {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            process_noise: process_noise.max(1e-9),
            measurement_noise: measurement_noise.max(1e-9),
            axes: None,
        }
    }

    fn estimate(axes: &[Axis; 3]) -> Vector3<f32> {
        Vector3::new(axes[0].state[0], axes[1].state[0], axes[2].state[0])
    }

    /// Current velocity estimate, meters per tick
    pub fn velocity(&self) -> Option<Vector3<f32>> {
        self.axes
            .as_ref()
            .map(|a| Vector3::new(a[0].state[1], a[1].state[1], a[2].state[1]))
    }
}

impl FilterStage for KalmanStage {
    fn name(&self) -> &'static str {
        "kalman"
    }

    fn process(&mut self, input: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
        let (q, r) = (self.process_noise, self.measurement_noise);
        if let Some(axes) = self.axes.as_mut() {
            for (i, axis) in axes.iter_mut().enumerate() {
                axis.predict(q);
                if let Some(p) = input {
                    axis.update(p[i], r);
                }
            }
            return Some(Self::estimate(axes));
        }

        let p = input?;
        self.axes = Some([Axis::new(p.x, r), Axis::new(p.y, r), Axis::new(p.z, r)]);
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut kf = KalmanStage::new(1e-3, 1e-2);
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(kf.process(Some(p)), Some(p));
        assert_eq!(KalmanStage::new(1e-3, 1e-2).process(None), None);
    }

    #[test]
    fn test_converges_on_static_point() {
        let mut kf = KalmanStage::new(1e-4, 1e-2);
        let target = Vector3::new(0.5, -0.5, 1.0);
        let mut out = None;
        for i in 0..200 {
            let jitter = if i % 2 == 0 { 0.01 } else { -0.01 };
            out = kf.process(Some(target.add_scalar(jitter)));
        }
        let out = out.unwrap();
        assert!((out - target).norm() < 0.01, "got {out:?}");
    }

    #[test]
    fn test_coasts_through_missing_ticks() {
        let mut kf = KalmanStage::new(1e-3, 1e-4);
        for i in 0..50 {
            kf.process(Some(Vector3::new(i as f32 * 0.01, 0.0, 0.0)));
        }
        let v = kf.velocity().unwrap();
        assert!((v.x - 0.01).abs() < 0.002, "velocity {v:?}");

        let before = kf.process(Some(Vector3::new(0.5, 0.0, 0.0))).unwrap();
        let coasted = kf.process(None).unwrap();
        assert!(coasted.x > before.x);
    }
}
