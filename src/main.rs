use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use crossterm::event::{self, Event, KeyCode};

use attitude_tracker_rs::calibration::CalibProfile;
use attitude_tracker_rs::fusion::EstimatorBank;
use attitude_tracker_rs::recorder::Recorder;
use attitude_tracker_rs::types::RawSample;
use attitude_tracker_rs::view::{current_timestamp, StatusSnapshot, ViewFeed};
use attitude_tracker_rs::wire::SampleReader;

#[derive(Parser, Debug)]
#[command(name = "attitude_tracker")]
#[command(
    about = "IMU attitude tracker - four orientation estimators side by side",
    long_about = None
)]
struct Args {
    /// Serial device node, raw capture file, or '-' for stdin
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Calibration profile (JSON); compiled-in defaults when omitted
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Directory for recorded rotation-matrix logs
    #[arg(long, default_value = "output")]
    output_dir: String,

    /// Publish a JSON status snapshot to this path (empty = disabled)
    #[arg(long, default_value = "")]
    status_file: String,

    /// Stop after this many seconds (0 = run until Esc)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Start recording immediately
    #[arg(long)]
    record: bool,
}

fn ts_now() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

fn open_source(port: &str) -> Result<Box<dyn BufRead + Send>> {
    if port == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(port).with_context(|| format!("opening sample source {port}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Reader thread: parses the byte stream into samples and feeds the fusion
/// loop over a bounded channel, in order. Timeouts on a quiet link drop the
/// partial line and retry; the channel closing ends the stream.
fn spawn_reader(source: Box<dyn BufRead + Send>, discarded: Arc<AtomicU64>) -> Receiver<RawSample> {
    let (tx, rx) = bounded::<RawSample>(64);
    thread::spawn(move || {
        let mut reader = SampleReader::new(source);
        loop {
            match reader.next_sample() {
                Ok(Some(sample)) => {
                    discarded.store(reader.discarded, Ordering::Relaxed);
                    if tx.send(sample).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    log::info!(
                        "[WIRE] sample stream ended ({} lines discarded)",
                        reader.discarded
                    );
                    break;
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    log::warn!("[WIRE] read failed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let profile = match &args.calibration {
        Some(path) => CalibProfile::load(path)?,
        None => CalibProfile::default(),
    };

    let source = open_source(&args.port)?;
    let discarded = Arc::new(AtomicU64::new(0));
    let samples = spawn_reader(source, Arc::clone(&discarded));

    let mut bank = EstimatorBank::new();
    let mut recorder = Recorder::new(&args.output_dir);
    let mut feed = ViewFeed::new(512);

    if args.record {
        let path = recorder.start()?;
        println!("[{}] Recording to {}", ts_now(), path.display());
    }

    println!("[{}] Tracking started on {}", ts_now(), args.port);

    let started = Instant::now();
    let mut prev_step: Option<Instant> = None;
    let mut sample_count = 0u64;

    loop {
        if args.duration > 0 && started.elapsed().as_secs() >= args.duration {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }

        // Keyboard commands are handled between samples.
        if event::poll(Duration::ZERO).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                match key.code {
                    KeyCode::Esc => {
                        println!("[{}] Quit requested", ts_now());
                        break;
                    }
                    KeyCode::Char('r') => {
                        bank.reset_references();
                        log::info!("[KEY] estimators reset to navigation references");
                    }
                    KeyCode::Char('g') => {
                        bank.align_integrator();
                        log::info!("[KEY] integrator aligned to ESKF attitude");
                    }
                    KeyCode::Char('q') => match recorder.start() {
                        Ok(path) => {
                            println!("[{}] Started recording to {}", ts_now(), path.display())
                        }
                        Err(e) => log::warn!("[RECORD] start failed: {e}"),
                    },
                    KeyCode::Char('w') => {
                        if recorder.stop().is_some() {
                            println!("[{}] Stopped recording", ts_now());
                        }
                    }
                    _ => {}
                }
            }
        }

        let sample = match samples.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => sample,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                println!("[{}] Sample stream closed", ts_now());
                break;
            }
        };

        // dt is wall-clock between step starts; the first step runs at 0.
        let now = Instant::now();
        let dt = prev_step.map(|t| (now - t).as_secs_f64()).unwrap_or(0.0);
        prev_step = Some(now);

        let calibrated = profile.apply(&sample);
        if let Err(e) = bank.step(dt, &calibrated) {
            log::warn!("[FUSION] step rejected ({e}); resetting estimators");
            bank.reset_references();
            continue;
        }
        sample_count += 1;

        let frame = bank.snapshot(&calibrated);
        if let Err(e) = recorder.write_row(&frame.log_row()) {
            log::warn!("[RECORD] write failed, stopping recording: {e}");
            recorder.stop();
        }
        feed.update(&calibrated, frame);

        if sample_count % 256 == 0 {
            let sigma = feed.sigma.latest().unwrap_or(0.0);
            log::info!(
                "[STATUS] {} samples, sigma {:.3e}, {} lines discarded",
                sample_count,
                sigma,
                discarded.load(Ordering::Relaxed)
            );
            if !args.status_file.is_empty() {
                let q = bank.qeskf().quaternion();
                let status = StatusSnapshot {
                    timestamp: current_timestamp(),
                    samples: sample_count,
                    discarded_lines: discarded.load(Ordering::Relaxed),
                    sigma,
                    quaternion: [q[0], q[1], q[2], q[3]],
                    recording: recorder.path().map(|p| p.display().to_string()),
                };
                if let Err(e) = status.save(&args.status_file) {
                    log::warn!("[STATUS] snapshot write failed: {e}");
                }
            }
        }
    }

    recorder.stop();
    println!("[{}] {} samples processed", ts_now(), sample_count);
    Ok(())
}
