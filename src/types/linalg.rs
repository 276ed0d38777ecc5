//! Fixed-size linear algebra for the attitude filters.
//!
//! Column-vector convention throughout. A quaternion is a `[w, x, y, z]`
//! 4-vector with `w` the scalar part; rotation vectors convert to
//! quaternions through the exponential map.

use nalgebra::{SMatrix, SVector};

pub type Vec3 = SVector<f64, 3>;
pub type Vec4 = SVector<f64, 4>;
pub type Vec6 = SVector<f64, 6>;
pub type Mat3 = SMatrix<f64, 3, 3>;
pub type Mat4 = SMatrix<f64, 4, 4>;
pub type Mat6 = SMatrix<f64, 6, 6>;

/// Jacobian of a stacked two-vector measurement w.r.t. a 3-DOF error state.
pub type Mat6x3 = SMatrix<f64, 6, 3>;

/// Rotation angles below this are treated as zero.
pub const SMALL_ANGLE: f64 = 1e-8;

/// Cross-product matrix: `skew(v) * w == v × w`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}

/// Left Hamilton product matrix: `qmul(p, q) == qmat_l(p) * q`.
pub fn qmat_l(q: &Vec4) -> Mat4 {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    Mat4::new(
        w, -x, -y, -z, //
        x, w, -z, y, //
        y, z, w, -x, //
        z, -y, x, w,
    )
}

/// Right product matrix: `qmul(p, q) == qmat_r(q) * p`.
pub fn qmat_r(q: &Vec4) -> Mat4 {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    Mat4::new(
        w, -x, -y, -z, //
        x, w, z, -y, //
        y, -z, w, x, //
        z, y, -x, w,
    )
}

/// Hamilton product `p ⊗ q`.
pub fn qmul(p: &Vec4, q: &Vec4) -> Vec4 {
    qmat_l(p) * q
}

pub fn qconj(q: &Vec4) -> Vec4 {
    Vec4::new(q[0], -q[1], -q[2], -q[3])
}

pub fn qinv(q: &Vec4) -> Vec4 {
    qconj(q) / q.norm_squared()
}

/// Exponential map from a rotation vector to a unit quaternion.
///
/// The axis is `v / ‖v‖`, the angle `‖v‖` radians; below [`SMALL_ANGLE`]
/// the identity quaternion is returned so a zero `dt` never divides by zero.
pub fn qrotv(v: &Vec3) -> Vec4 {
    let d = v.norm();
    if d < SMALL_ANGLE {
        return Vec4::new(1.0, 0.0, 0.0, 0.0);
    }
    let s = (d / 2.0).sin() / d;
    Vec4::new((d / 2.0).cos(), s * v[0], s * v[1], s * v[2])
}

/// Rotation matrix of a unit quaternion:
/// `qv qv^T + q0² I + 2 q0 [qv]× + [qv]×²`.
pub fn rmat3(q: &Vec4) -> Mat3 {
    let q0 = q[0];
    let qv = Vec3::new(q[1], q[2], q[3]);
    let sk = skew(&qv);
    qv * qv.transpose() + Mat3::identity() * (q0 * q0) + 2.0 * q0 * sk + sk * sk
}

/// [`rmat3`] embedded in a homogeneous 4×4 for the renderer.
pub fn rmat4(q: &Vec4) -> Mat4 {
    mat3_to_mat4(&rmat3(q))
}

pub fn mat3_to_mat4(m: &Mat3) -> Mat4 {
    let mut out = Mat4::identity();
    out.fixed_view_mut::<3, 3>(0, 0).copy_from(m);
    out
}

/// Matrix exponential of `skew(w)` by the closed-form Rodrigues expansion
/// `I + sinθ/θ · K + (1-cosθ)/θ² · K²` with `θ = ‖w‖`.
///
/// The filters only ever exponentiate skew-symmetric matrices, so the
/// generic Padé machinery is not needed.
pub fn expm_skew(w: &Vec3) -> Mat3 {
    let theta = w.norm();
    let k = skew(w);
    if theta < SMALL_ANGLE {
        // Taylor limits of the two coefficients.
        return Mat3::identity() + k + 0.5 * (k * k);
    }
    Mat3::identity() + (theta.sin() / theta) * k + ((1.0 - theta.cos()) / (theta * theta)) * (k * k)
}
