//! The fusion driver core: four orientation estimators stepped in lockstep
//! from one calibrated sample stream.

use nalgebra::Cholesky;

use crate::filters::{FilterError, FilterResult, QuaternionEskf, QuaternionIntegrator, VectorEkf};
use crate::types::linalg::{mat3_to_mat4, skew, Mat3, Mat4, Vec3};
use crate::types::CalibratedSample;

/// Magnetic dip angle at the calibration site, degrees below horizontal.
pub const MAG_DIP_DEG: f64 = 17.0;

/// Measurement variance handed to both vector EKFs.
const VEKF_MEASUREMENT_VAR: f64 = 1.0;

/// Gravity direction in the navigation frame (z-axis up).
pub fn nav_gravity() -> Vec3 {
    Vec3::new(0.0, 0.0, -1.0)
}

/// Local magnetic field direction in the navigation frame.
pub fn nav_magnetic() -> Vec3 {
    let dip = MAG_DIP_DEG.to_radians();
    Vec3::new(0.0, dip.sin(), -dip.cos())
}

/// Per-sample output frame: the four rotation matrices shown side by side,
/// plus the QESKF uncertainty scalar.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    pub accmag: Mat4,
    pub gyro: Mat4,
    pub qeskf: Mat4,
    pub vekf: Mat4,
    pub sigma: f64,
}

impl FrameSnapshot {
    /// Row-major 3×3 blocks in recording order:
    /// accmag, gyro-only, qeskf, vekf pair.
    pub fn log_row(&self) -> [f64; 36] {
        let mut row = [0.0; 36];
        for (slot, m) in [&self.accmag, &self.gyro, &self.qeskf, &self.vekf]
            .iter()
            .enumerate()
        {
            for i in 0..3 {
                for j in 0..3 {
                    row[slot * 9 + i * 3 + j] = m[(i, j)];
                }
            }
        }
        row
    }
}

/// The four estimators, owned as plain values and stepped with the same
/// `dt` and the same sample every cycle.
pub struct EstimatorBank {
    qeskf: QuaternionEskf,
    qint: QuaternionIntegrator,
    acc_vekf: VectorEkf,
    mag_vekf: VectorEkf,
}

impl EstimatorBank {
    pub fn new() -> Self {
        Self {
            qeskf: QuaternionEskf::new(nav_gravity(), nav_magnetic()),
            qint: QuaternionIntegrator::new(),
            acc_vekf: VectorEkf::new(VEKF_MEASUREMENT_VAR),
            mag_vekf: VectorEkf::new(VEKF_MEASUREMENT_VAR),
        }
    }

    pub fn qeskf(&self) -> &QuaternionEskf {
        &self.qeskf
    }

    pub fn qint(&self) -> &QuaternionIntegrator {
        &self.qint
    }

    pub fn acc_vekf(&self) -> &VectorEkf {
        &self.acc_vekf
    }

    pub fn mag_vekf(&self) -> &VectorEkf {
        &self.mag_vekf
    }

    /// Step every estimator. A filter that rejects the sample keeps its
    /// previous state; the first rejection is returned after all four have
    /// been driven, so one bad filter never starves the others.
    pub fn step(&mut self, dt: f64, sample: &CalibratedSample) -> FilterResult<()> {
        self.qint.step(dt, &sample.rot);

        let mut first_err: Option<FilterError> = None;
        if let Err(e) = self.qeskf.step(dt, &sample.acc, &sample.mag, &sample.rot) {
            log::warn!("[FUSION] qeskf step rejected: {e}");
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.acc_vekf.step(dt, &sample.acc, &sample.rot) {
            log::warn!("[FUSION] acc vekf step rejected: {e}");
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.mag_vekf.step(dt, &sample.mag, &sample.rot) {
            log::warn!("[FUSION] mag vekf step rejected: {e}");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Snap the QESKF back to identity and re-seed the vector filters with
    /// the navigation references.
    pub fn reset_references(&mut self) {
        self.qeskf.reset_orientation();
        self.acc_vekf.reset(-nav_gravity());
        self.mag_vekf.reset(nav_magnetic());
    }

    /// Copy the corrected attitude into the dead-reckoning baseline.
    pub fn align_integrator(&mut self) {
        self.qint.set_quaternion(self.qeskf.quaternion());
    }

    pub fn snapshot(&self, sample: &CalibratedSample) -> FrameSnapshot {
        FrameSnapshot {
            accmag: orthonormal_frame(&-sample.acc, &sample.mag),
            gyro: self.qint.matrix(),
            qeskf: self.qeskf.matrix(),
            vekf: orthonormal_frame(&-self.acc_vekf.vector(), &self.mag_vekf.vector()),
            sigma: covariance_sigma(&self.qeskf.covariance()),
        }
    }
}

impl Default for EstimatorBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Right-handed orthonormal frame from a gravity direction and a field
/// direction: `ez` opposes gravity, `ex` is the field cross `ez`, rows
/// `ex, ey, ez`. Degenerate inputs (zero or parallel vectors) fall back to
/// the identity frame.
pub fn orthonormal_frame(g: &Vec3, m: &Vec3) -> Mat4 {
    let gn = g.norm();
    if gn < 1e-12 {
        return Mat4::identity();
    }
    let ez = -g / gn;
    let ex = skew(m) * ez;
    let exn = ex.norm();
    if exn < 1e-12 {
        return Mat4::identity();
    }
    let ex = ex / exn;
    let ey = skew(&ez) * ex;

    let mut r = Mat3::zeros();
    r.row_mut(0).copy_from(&ex.transpose());
    r.row_mut(1).copy_from(&ey.transpose());
    r.row_mut(2).copy_from(&ez.transpose());
    mat3_to_mat4(&r)
}

/// `sqrt(det P)`, the scalar uncertainty shown on the covariance graph.
/// Computed as the product of the Cholesky diagonal; a matrix that has lost
/// positive definiteness to rounding reads as zero.
pub fn covariance_sigma(p: &Mat3) -> f64 {
    match Cholesky::new(*p) {
        Some(chol) => chol.l().diagonal().iter().product(),
        None => 0.0,
    }
}
