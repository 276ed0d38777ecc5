use super::{FilterError, FilterResult};
use crate::types::linalg::{
    expm_skew, qmul, qrotv, rmat3, rmat4, skew, Mat3, Mat4, Mat6, Mat6x3, Vec3, Vec4, Vec6,
};

/// Spectral density of the error-state process noise.
const PROCESS_NOISE_DENSITY: f64 = 0.01;

/// Quaternion error-state Kalman filter.
///
/// The nominal state is a unit quaternion rotating body into navigation
/// frame; the error state is a 3-vector small-angle rotation, so the
/// covariance stays 3×3 and free of the unit-norm constraint. Prediction
/// uses the gyro through the exact exponential map; the update stacks the
/// accelerometer and magnetometer residuals against the navigation-frame
/// gravity and field references.
#[derive(Clone, Debug)]
pub struct QuaternionEskf {
    q: Vec4,
    p: Mat3,
    acc_var: f64,
    mag_var: f64,
    g_ref: Vec3,
    m_ref: Vec3,
}

impl QuaternionEskf {
    /// `g_ref` and `m_ref` are the unit gravity and magnetic directions in
    /// the navigation frame.
    pub fn new(g_ref: Vec3, m_ref: Vec3) -> Self {
        Self {
            q: Vec4::new(1.0, 0.0, 0.0, 0.0),
            p: Mat3::identity(),
            acc_var: 0.0,
            mag_var: 1.0,
            g_ref,
            m_ref,
        }
    }

    pub fn quaternion(&self) -> Vec4 {
        self.q
    }

    pub fn matrix(&self) -> Mat4 {
        rmat4(&self.q)
    }

    pub fn covariance(&self) -> Mat3 {
        self.p
    }

    /// Current adaptive accelerometer measurement variance.
    pub fn acc_variance(&self) -> f64 {
        self.acc_var
    }

    /// Magnetometer measurement variance, applied on every step.
    /// Defaults to 1.
    pub fn set_mag_variance(&mut self, var: f64) {
        self.mag_var = var;
    }

    /// Snap the nominal attitude back to identity. Covariance and the
    /// adaptive variance keep their values.
    pub fn reset_orientation(&mut self) {
        self.q = Vec4::new(1.0, 0.0, 0.0, 0.0);
    }

    pub fn step(&mut self, dt: f64, acc: &Vec3, mag: &Vec3, rot: &Vec3) -> FilterResult<()> {
        let q_noise = Mat3::identity() * (PROCESS_NOISE_DENSITY * dt);

        // The accelerometer variance rises when the reading leaves 1 g,
        // i.e. when linear acceleration contaminates gravity. The squared
        // squared-magnitude deviation is intentional.
        let dev = 1.0 - acc.norm_squared();
        self.acc_var = 0.9 * self.acc_var + 0.1 * (0.1 + 4.0 * dev * dev);

        let mut r = Mat6::zeros();
        r.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Mat3::identity() * self.acc_var));
        r.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Mat3::identity() * self.mag_var));

        // Predict: exact on the manifold, first order on the covariance.
        let q_p = qmul(&self.q, &qrotv(&(rot * dt)));
        let f = expm_skew(&(rot * -dt));
        let p_p = f * self.p * f.transpose() + q_noise;

        // Navigation references seen from the predicted body frame. The
        // accelerometer measures specific force, hence the sign on gravity.
        let r_nav_to_body = rmat3(&q_p).transpose();
        let g_body = r_nav_to_body * self.g_ref;
        let m_body = r_nav_to_body * self.m_ref;

        let mut y_p = Vec6::zeros();
        y_p.fixed_rows_mut::<3>(0).copy_from(&(-g_body));
        y_p.fixed_rows_mut::<3>(3).copy_from(&m_body);

        let mut h = Mat6x3::zeros();
        h.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew(&g_body)));
        h.fixed_view_mut::<3, 3>(3, 0).copy_from(&skew(&m_body));

        let mut y = Vec6::zeros();
        y.fixed_rows_mut::<3>(0).copy_from(acc);
        y.fixed_rows_mut::<3>(3).copy_from(mag);

        let s = h * p_p * h.transpose() + r;
        let s_inv = s.try_inverse().ok_or(FilterError::SingularInnovation)?;
        let k = p_p * h.transpose() * s_inv;
        let dx: Vec3 = k * (y - y_p);
        let p_t = p_p - k * h * p_p;

        // Inject the error and re-linearize the covariance about the new
        // nominal; J P J^T keeps P exactly symmetric.
        let q_new = qmul(&q_p, &qrotv(&dx));
        let j = Mat3::identity() - 0.5 * skew(&dx);
        let p_new = j * p_t * j.transpose();

        if !dx.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NonFinite("error state"));
        }
        if !q_new.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NonFinite("quaternion"));
        }
        if !p_new.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NonFinite("covariance"));
        }
        self.q = q_new;
        self.p = p_new;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_covariance(&mut self, p: Mat3) {
        self.p = p;
    }
}
