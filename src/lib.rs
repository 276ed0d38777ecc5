//! Attitude tracking core: sensor calibration plus four competing
//! orientation estimators fed from one IMU sample stream.

pub mod calibration;
pub mod filters;
pub mod fusion;
pub mod recorder;
pub mod types;
pub mod view;
pub mod wire;
