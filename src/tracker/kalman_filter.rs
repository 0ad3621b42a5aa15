//! Constant-velocity Kalman filter over box measurements in XYAH space.
//!
//! State is `(cx, cy, a, h, vx, vy, va, vh)`; measurements are `(cx, cy, a, h)`.
//! Noise scales with box height so that large (near) vehicles tolerate larger
//! pixel jitter than small (far) ones.

use nalgebra::{Matrix4, SMatrix, SVector, Vector4};

pub type StateVector = SVector<f64, 8>;
pub type StateCovariance = SMatrix<f64, 8, 8>;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f64, 8, 8>,
    update_mat: SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = SMatrix::<f64, 8, 8>::identity();
        let mut update_mat = SMatrix::<f64, 4, 8>::zeros();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
            update_mat[(i, i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Seed a track state from its first measurement, with zero velocity.
    pub fn initiate(&self, measurement: [f64; 4]) -> (StateVector, StateCovariance) {
        let mut mean = StateVector::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&Vector4::from(measurement));

        let h = measurement[3];
        let pos = 2.0 * self.std_weight_position * h;
        let vel = 10.0 * self.std_weight_velocity * h;
        let std = StateVector::from([pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        (mean, StateCovariance::from_diagonal(&std.component_mul(&std)))
    }

    pub fn predict(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
    ) -> (StateVector, StateCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let std = StateVector::from([pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);
        let motion_cov = StateCovariance::from_diagonal(&std.component_mul(&std));

        let new_mean = self.motion_mat * mean;
        let new_covariance =
            self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;

        (new_mean, new_covariance)
    }

    fn project(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
    ) -> (Vector4<f64>, Matrix4<f64>) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let std = Vector4::new(pos, pos, 1e-1, pos);
        let innovation_cov = Matrix4::from_diagonal(&std.component_mul(&std));

        let mean_proj = self.update_mat * mean;
        let covariance_proj =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;

        (mean_proj, covariance_proj)
    }

    /// Fold a measurement into the state.
    ///
    /// Returns `None` when the innovation covariance is singular, which only
    /// happens for zero-height boxes; callers re-seed the state in that case.
    pub fn update(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
        measurement: [f64; 4],
    ) -> Option<(StateVector, StateCovariance)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let s_inv = projected_cov.try_inverse()?;

        // K = P * H^T * S^-1
        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;
        let innovation = Vector4::from(measurement) - projected_mean;

        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();

        Some((new_mean, new_covariance))
    }
}
