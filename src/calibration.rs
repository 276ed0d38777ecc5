//! Sensor conditioning: raw integer counts to normalized physical vectors.
//!
//! The profile is a pure affine model per sensor (bias, gain, and for the
//! magnetometer an axis map aligning its package axes with the IMU body
//! frame). Out-of-range counts pass straight through.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::linalg::{Mat3, Vec3};
use crate::types::{CalibratedSample, RawSample};

/// Gyro counts to rad/s: full scale is ±1000 °/s over a signed 16-bit range.
const GYRO_COUNT_TO_RAD: f64 = 1000.0 / 32768.0 * std::f64::consts::PI / 180.0;

/// Per-unit calibration constants, persisted as JSON.
///
/// Immutable after construction; the compiled-in default carries the values
/// measured for the reference board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibProfile {
    pub acc_bias: [f64; 3],
    pub acc_gain: [f64; 3],
    pub mag_bias: [f64; 3],
    pub mag_gain: [f64; 3],
    /// Row-major axis map applied after bias/gain normalization.
    pub mag_axes: [[f64; 3]; 3],
    pub gyro_bias: [f64; 3],
}

impl Default for CalibProfile {
    fn default() -> Self {
        Self {
            acc_bias: [-547.0262, -96.7392, 92.4361],
            acc_gain: [16421.0 / 2.0, 16454.0 / 2.0, 16611.0 / 2.0],
            mag_bias: [78.1810, 60.9789, -21.9482],
            mag_gain: [323.9201, 320.9182, 321.4008],
            mag_axes: [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],
            gyro_bias: [-0.6874, -39.7461, -19.8377],
        }
    }
}

impl CalibProfile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading calibration profile {}", path.display()))?;
        let profile = serde_json::from_str(&text)
            .with_context(|| format!("parsing calibration profile {}", path.display()))?;
        Ok(profile)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("writing calibration profile {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Condition one raw sample into normalized body-frame measurements.
    pub fn apply(&self, raw: &RawSample) -> CalibratedSample {
        CalibratedSample {
            acc: self.accelerometer(&raw.acc),
            mag: self.magnetometer(&raw.mag),
            rot: self.gyroscope(&raw.rot),
        }
    }

    /// `(raw - bias) / gain`, componentwise; ~1 g maps to unit magnitude.
    fn accelerometer(&self, counts: &[i32; 3]) -> Vec3 {
        Vec3::new(
            (counts[0] as f64 - self.acc_bias[0]) / self.acc_gain[0],
            (counts[1] as f64 - self.acc_bias[1]) / self.acc_gain[1],
            (counts[2] as f64 - self.acc_bias[2]) / self.acc_gain[2],
        )
    }

    /// Bias/gain normalization first, then the axis map into the body frame.
    fn magnetometer(&self, counts: &[i32; 3]) -> Vec3 {
        let normalized = Vec3::new(
            (counts[0] as f64 - self.mag_bias[0]) / self.mag_gain[0],
            (counts[1] as f64 - self.mag_bias[1]) / self.mag_gain[1],
            (counts[2] as f64 - self.mag_bias[2]) / self.mag_gain[2],
        );
        self.mag_axis_map() * normalized
    }

    /// Bias removal and count scaling to rad/s.
    fn gyroscope(&self, counts: &[i32; 3]) -> Vec3 {
        Vec3::new(
            (counts[0] as f64 - self.gyro_bias[0]) * GYRO_COUNT_TO_RAD,
            (counts[1] as f64 - self.gyro_bias[1]) * GYRO_COUNT_TO_RAD,
            (counts[2] as f64 - self.gyro_bias[2]) * GYRO_COUNT_TO_RAD,
        )
    }

    fn mag_axis_map(&self) -> Mat3 {
        let m = &self.mag_axes;
        Mat3::new(
            m[0][0], m[0][1], m[0][2], //
            m[1][0], m[1][1], m[1][2], //
            m[2][0], m[2][1], m[2][2],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_accelerometer_is_unit() {
        let profile = CalibProfile::default();
        // One gain above bias on z, bias-level counts on x/y.
        let raw = RawSample {
            acc: [-547, -97, 8398],
            mag: [0, 0, 0],
            rot: [0, 0, 0],
        };
        let cal = profile.apply(&raw);
        assert_relative_eq!(cal.acc.norm(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(cal.acc[2], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_magnetometer_axis_swap() {
        let profile = CalibProfile::default();
        // One gain along the package x-axis maps to body y.
        let raw = RawSample {
            acc: [0, 0, 0],
            mag: [402, 61, -22],
            rot: [0, 0, 0],
        };
        let cal = profile.apply(&raw);
        assert_relative_eq!(cal.mag[1], 1.0, epsilon = 1e-2);
        assert_relative_eq!(cal.mag.norm(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_gyroscope_zero_rate_at_bias() {
        let profile = CalibProfile::default();
        let raw = RawSample {
            acc: [0, 0, 0],
            mag: [0, 0, 0],
            rot: [-1, -40, -20],
        };
        let cal = profile.apply(&raw);
        assert!(cal.rot.norm() < 1e-3, "rate at bias counts: {}", cal.rot.norm());
    }

    #[test]
    fn test_gyroscope_full_scale() {
        let profile = CalibProfile::default();
        let raw = RawSample {
            acc: [0, 0, 0],
            mag: [0, 0, 0],
            rot: [0, 0, 32748],
        };
        let cal = profile.apply(&raw);
        // 32768 counts above bias is 1000 °/s.
        assert_relative_eq!(cal.rot[2], 1000.0_f64.to_radians(), epsilon = 1e-3);
    }

    #[test]
    fn test_profile_json_round_trip() {
        let dir = std::env::temp_dir().join("attitude_tracker_calib_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profile.json");

        let profile = CalibProfile::default();
        profile.save(&path).unwrap();
        let loaded = CalibProfile::load(&path).unwrap();
        assert_eq!(profile, loaded);

        std::fs::remove_file(&path).ok();
    }
}
