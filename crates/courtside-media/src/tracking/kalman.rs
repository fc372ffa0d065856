//! Constant-velocity Kalman filter over `[x, y, vx, vy]`.
//!
//! Time is measured in frames (`dt = 1`), so velocities are pixels per frame.
//! Only positions are measured. The filter is a pure function of its prior
//! state, covariance and the measurement.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanParams {
    /// Initial covariance diagonal
    pub initial_covariance: f64,
    /// Process noise diagonal
    pub process_noise: f64,
    /// Measurement noise diagonal
    pub measurement_noise: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            initial_covariance: 1000.0,
            process_noise: 0.03,
            measurement_noise: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KalmanFilter {
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    params: KalmanParams,
}

impl KalmanFilter {
    /// Start at a measured position with unknown velocity.
    pub fn new(x: f64, y: f64, params: KalmanParams) -> Self {
        Self {
            state: Vector4::new(x, y, 0.0, 0.0),
            covariance: Matrix4::from_diagonal_element(params.initial_covariance),
            params,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.state[0], self.state[1])
    }

    /// Filtered velocity in pixels per frame.
    pub fn velocity(&self) -> (f64, f64) {
        (self.state[2], self.state[3])
    }

    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.covariance
    }

    /// Advance one frame: `x = F x`, `P = F P F^T + Q`.
    pub fn predict(&mut self) {
        let f = transition();
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose()
            + Matrix4::from_diagonal_element(self.params.process_noise);
    }

    /// Fold in a position measurement. A singular innovation covariance leaves
    /// the state untouched.
    pub fn update(&mut self, zx: f64, zy: f64) {
        let h = observation();
        let r = Matrix2::from_diagonal_element(self.params.measurement_noise);

        let s = h * self.covariance * h.transpose() + r;
        let Some(s_inv) = s.try_inverse() else {
            return;
        };
        let gain = self.covariance * h.transpose() * s_inv;

        let innovation = Vector2::new(zx, zy) - h * self.state;
        self.state += gain * innovation;
        self.covariance = (Matrix4::identity() - gain * h) * self.covariance;
    }
}

fn transition() -> Matrix4<f64> {
    let mut f = Matrix4::identity();
    f[(0, 2)] = 1.0;
    f[(1, 3)] = 1.0;
    f
}

/// Selects the position rows.
fn observation() -> Matrix2x4<f64> {
    let mut h = Matrix2x4::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = 1.0;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converges_to_constant_velocity() {
        let mut kf = KalmanFilter::new(0.0, 0.0, KalmanParams::default());
        for t in 1..40 {
            kf.predict();
            kf.update(3.0 * t as f64, -2.0 * t as f64);
        }
        let (vx, vy) = kf.velocity();
        assert!((vx - 3.0).abs() < 0.2, "vx = {}", vx);
        assert!((vy + 2.0).abs() < 0.2, "vy = {}", vy);
    }

    #[test]
    fn test_predict_grows_uncertainty() {
        let mut kf = KalmanFilter::new(10.0, 10.0, KalmanParams::default());
        kf.update(10.0, 10.0);
        let before = kf.covariance()[(0, 0)];
        kf.predict();
        kf.predict();
        assert!(kf.covariance()[(0, 0)] > before);
    }

    #[test]
    fn test_update_is_deterministic() {
        let run = || {
            let mut kf = KalmanFilter::new(5.0, 5.0, KalmanParams::default());
            for z in [(6.0, 4.0), (7.5, 3.0), (9.0, 2.2)] {
                kf.predict();
                kf.update(z.0, z.1);
            }
            kf
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_measurement_pulls_position() {
        let mut kf = KalmanFilter::new(0.0, 0.0, KalmanParams::default());
        kf.predict();
        kf.update(100.0, 0.0);
        // Large prior uncertainty: the estimate moves almost all the way.
        assert!(kf.position().0 > 90.0);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut kf = KalmanFilter::new(0.0, 0.0, KalmanParams::default());
        for t in 1..20 {
            kf.predict();
            kf.update(2.0 * t as f64, 1.0 + t as f64);
        }
        let p = kf.covariance();
        assert!((p - p.transpose()).abs().max() < 1e-6);
        assert!(p[(2, 2)] > 0.0 && p[(3, 3)] > 0.0);
    }
}
