use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use attitude_tracker_rs::calibration::CalibProfile;
use attitude_tracker_rs::fusion::EstimatorBank;
use attitude_tracker_rs::wire::SampleReader;

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Re-run the estimator bank over a raw capture", long_about = None)]
struct Args {
    /// Raw capture: one line per sample, nine integer counts
    #[arg(long)]
    capture: PathBuf,

    /// Fixed step interval in seconds
    #[arg(long, default_value = "0.01")]
    dt: f64,

    /// Calibration profile (JSON); compiled-in defaults when omitted
    #[arg(long)]
    calibration: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let profile = match &args.calibration {
        Some(path) => CalibProfile::load(path)?,
        None => CalibProfile::default(),
    };

    let file = File::open(&args.capture)
        .with_context(|| format!("opening capture {}", args.capture.display()))?;
    let mut reader = SampleReader::new(BufReader::new(file));
    let mut bank = EstimatorBank::new();

    let mut samples = 0u64;
    let mut rejected = 0u64;
    let mut last_sigma = 0.0;
    while let Some(raw) = reader.next_sample()? {
        let calibrated = profile.apply(&raw);
        let dt = if samples == 0 { 0.0 } else { args.dt };
        if bank.step(dt, &calibrated).is_err() {
            rejected += 1;
            continue;
        }
        samples += 1;
        last_sigma = bank.snapshot(&calibrated).sigma;
    }

    let q = bank.qeskf().quaternion();
    let out = json!({
        "capture": args.capture.display().to_string(),
        "dt": args.dt,
        "samples": samples,
        "discarded_lines": reader.discarded,
        "rejected_steps": rejected,
        "sigma": last_sigma,
        "quaternion": [q[0], q[1], q[2], q[3]],
        "covariance_trace": bank.qeskf().covariance().trace(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
