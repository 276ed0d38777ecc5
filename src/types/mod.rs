pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One line from the IMU link: nine raw 16-bit counts, accelerometer then
/// magnetometer then gyroscope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub acc: [i32; 3],
    pub mag: [i32; 3],
    pub rot: [i32; 3],
}

/// Calibrated body-frame measurements handed to the filters.
///
/// `acc` and `mag` are normalized to unit magnitude in steady state; `rot`
/// is angular rate in rad/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibratedSample {
    pub acc: Vec3,
    pub mag: Vec3,
    pub rot: Vec3,
}
