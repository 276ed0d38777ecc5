use crate::types::linalg::{qmul, qrotv, rmat4, Mat4, Vec3, Vec4};

/// Gyro-only dead reckoning: `q ← q ⊗ qrotv(dt·ω)`.
///
/// No covariance, no measurement update. Serves as the drift baseline the
/// corrected estimators are judged against.
#[derive(Clone, Debug)]
pub struct QuaternionIntegrator {
    q: Vec4,
}

impl QuaternionIntegrator {
    pub fn new() -> Self {
        Self {
            q: Vec4::new(1.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn step(&mut self, dt: f64, rot: &Vec3) {
        self.q = qmul(&self.q, &qrotv(&(rot * dt)));
    }

    pub fn matrix(&self) -> Mat4 {
        rmat4(&self.q)
    }

    pub fn quaternion(&self) -> Vec4 {
        self.q
    }

    /// Re-seed from another estimator's attitude.
    pub fn set_quaternion(&mut self, q: Vec4) {
        self.q = q;
    }
}

impl Default for QuaternionIntegrator {
    fn default() -> Self {
        Self::new()
    }
}
