use super::{FilterError, FilterResult};
use crate::types::linalg::{expm_skew, skew, Mat3, Vec3};

/// Variance injected by the rotation process, orthogonal to the tracked
/// direction.
const ROTATION_PROCESS_VAR: f64 = 0.01;

/// Scalar-variance EKF over a single body-frame direction.
///
/// The direction is rotated by the gyro between observations and measured
/// directly (identity measurement model), so the state converges to the
/// measured vector at a rate set by `r`.
#[derive(Clone, Debug)]
pub struct VectorEkf {
    x: Vec3,
    p: Mat3,
    r: f64,
}

impl VectorEkf {
    pub fn new(r: f64) -> Self {
        Self {
            x: Vec3::new(1.0, 0.0, 0.0),
            p: Mat3::identity(),
            r,
        }
    }

    pub fn vector(&self) -> Vec3 {
        self.x
    }

    pub fn covariance(&self) -> Mat3 {
        self.p
    }

    /// Re-seed the tracked direction; covariance is left as is.
    pub fn reset(&mut self, direction: Vec3) {
        self.x = direction;
    }

    pub fn step(&mut self, dt: f64, vec: &Vec3, rot: &Vec3) -> FilterResult<()> {
        // Predict through the gyro rotation. The process term is the
        // negated square of the skew of the pre-predict state: PSD, and it
        // grows uncertainty only orthogonal to the tracked direction.
        let f = expm_skew(&(rot * -dt));
        let x_p = f * self.x;
        let sx = skew(&self.x);
        let p_p = f * self.p * f.transpose() - (ROTATION_PROCESS_VAR * dt) * (sx * sx);

        // Identity measurement model: K = P (P + R)^-1.
        let s = p_p + Mat3::identity() * self.r;
        let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;
        let k = p_p * s_inv;
        let x_new = x_p + k * (vec - x_p);
        let p_new = p_p - k * p_p;

        if !x_new.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NonFinite("state"));
        }
        if !p_new.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NonFinite("covariance"));
        }
        self.x = x_new;
        self.p = p_new;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_symmetric_psd(p: &Mat3) {
        assert!((p - p.transpose()).norm() < 1e-10, "P not symmetric: {p}");
        for lambda in p.symmetric_eigenvalues().iter() {
            assert!(*lambda >= -1e-10, "negative eigenvalue {lambda}");
        }
    }

    #[test]
    fn test_converges_to_measured_direction() {
        let mut vekf = VectorEkf::new(1.0);
        let target = Vec3::new(0.0, 0.0, -1.0);
        for _ in 0..100 {
            vekf.step(0.01, &target, &Vec3::zeros()).unwrap();
        }
        // The gain shrinks with P, so convergence is gradual at r = 1.
        assert!((vekf.vector() - target).norm() < 5e-2);
        for _ in 0..900 {
            vekf.step(0.01, &target, &Vec3::zeros()).unwrap();
        }
        assert_abs_diff_eq!(vekf.vector(), target, epsilon = 1e-3);
    }

    #[test]
    fn test_covariance_stays_symmetric_psd() {
        let mut vekf = VectorEkf::new(0.5);
        let rate = Vec3::new(0.3, -0.2, 0.8);
        let mut meas = Vec3::new(0.0, 0.0, 1.0);
        for _ in 0..200 {
            meas = expm_skew(&(rate * -0.01)) * meas;
            vekf.step(0.01, &meas, &rate).unwrap();
            assert_symmetric_psd(&vekf.covariance());
        }
    }

    #[test]
    fn test_process_noise_is_orthogonal_to_state() {
        // With the state aligned to z, the -skew(x)² term must not inflate
        // the zz entry.
        let mut vekf = VectorEkf::new(1.0);
        vekf.reset(Vec3::new(0.0, 0.0, 1.0));
        let sx = skew(&vekf.vector());
        let process = -(ROTATION_PROCESS_VAR * 0.01) * (sx * sx);
        assert_abs_diff_eq!(process[(2, 2)], 0.0, epsilon = 1e-15);
        assert!(process[(0, 0)] > 0.0);
        assert!(process[(1, 1)] > 0.0);
    }

    #[test]
    fn test_zero_dt_step_is_finite() {
        let mut vekf = VectorEkf::new(1.0);
        vekf.step(0.0, &Vec3::new(0.0, 1.0, 0.0), &Vec3::new(0.1, 0.2, 0.3))
            .unwrap();
        assert!(vekf.vector().iter().all(|v| v.is_finite()));
        assert_symmetric_psd(&vekf.covariance());
    }

    #[test]
    fn test_large_r_slows_convergence() {
        let target = Vec3::new(0.0, 1.0, 0.0);
        let mut fast = VectorEkf::new(0.01);
        let mut slow = VectorEkf::new(100.0);
        for _ in 0..20 {
            fast.step(0.01, &target, &Vec3::zeros()).unwrap();
            slow.step(0.01, &target, &Vec3::zeros()).unwrap();
        }
        let fast_err = (fast.vector() - target).norm();
        let slow_err = (slow.vector() - target).norm();
        assert!(fast_err < slow_err);
    }

    #[test]
    fn test_reset_overrides_direction() {
        let mut vekf = VectorEkf::new(1.0);
        vekf.reset(Vec3::new(0.0, 1.0, 0.0));
        assert_abs_diff_eq!(vekf.vector(), Vec3::new(0.0, 1.0, 0.0), epsilon = 0.0);
    }
}
