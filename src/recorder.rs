//! Raw-log writer: one line of 36 floats per processed sample, the
//! row-major rotation blocks of the four estimators.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Highest recording index probed before giving up.
const MAX_RECORDING_INDEX: u32 = 10_000;

pub struct Recorder {
    out_dir: PathBuf,
    active: Option<(PathBuf, BufWriter<File>)>,
    rows: u64,
}

impl Recorder {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            active: None,
            rows: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.active.as_ref().map(|(p, _)| p.as_path())
    }

    /// Open `data<N>.txt` for the smallest `N` not already on disk. A
    /// running recording is closed first, so this doubles as rollover.
    pub fn start(&mut self) -> io::Result<PathBuf> {
        self.stop();
        fs::create_dir_all(&self.out_dir)?;
        for n in 1..MAX_RECORDING_INDEX {
            let path = self.out_dir.join(format!("data{n}.txt"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    self.active = Some((path.clone(), BufWriter::new(file)));
                    self.rows = 0;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::Other,
            "no free recording slot",
        ))
    }

    /// Close the current file, returning its path if one was open.
    pub fn stop(&mut self) -> Option<PathBuf> {
        let (path, mut file) = self.active.take()?;
        if let Err(e) = file.flush() {
            log::warn!("[RECORD] flush failed for {}: {e}", path.display());
        }
        log::info!("[RECORD] {} rows -> {}", self.rows, path.display());
        Some(path)
    }

    /// Append one frame; a no-op while not recording.
    pub fn write_row(&mut self, row: &[f64; 36]) -> io::Result<()> {
        let Some((_, file)) = self.active.as_mut() else {
            return Ok(());
        };
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                file.write_all(b" ")?;
            }
            write!(file, "{value}")?;
        }
        file.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("attitude_tracker_rec_{tag}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_picks_smallest_free_index() {
        let dir = temp_dir("index");
        fs::write(dir.join("data1.txt"), "").unwrap();
        fs::write(dir.join("data3.txt"), "").unwrap();

        let mut recorder = Recorder::new(&dir);
        let path = recorder.start().unwrap();
        assert_eq!(path, dir.join("data2.txt"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_start_rolls_over() {
        let dir = temp_dir("rollover");
        let mut recorder = Recorder::new(&dir);
        let first = recorder.start().unwrap();
        recorder.write_row(&[0.5; 36]).unwrap();
        let second = recorder.start().unwrap();
        assert_ne!(first, second);
        assert!(recorder.is_recording());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_row_format() {
        let dir = temp_dir("format");
        let mut recorder = Recorder::new(&dir);
        let path = recorder.start().unwrap();

        let mut row = [0.0; 36];
        row[0] = 1.0;
        row[35] = -0.25;
        recorder.write_row(&row).unwrap();
        recorder.stop();

        let text = fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = text.trim_end().split(' ').collect();
        assert_eq!(fields.len(), 36);
        assert_eq!(fields[0], "1");
        assert_eq!(fields[35], "-0.25");
        assert!(text.ends_with('\n'));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_without_recording_is_noop() {
        let dir = temp_dir("noop");
        let mut recorder = Recorder::new(&dir);
        recorder.write_row(&[1.0; 36]).unwrap();
        assert!(!recorder.is_recording());
        assert!(recorder.stop().is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
