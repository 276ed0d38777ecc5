//! What the external visualizer consumes: the nine calibrated signal
//! traces, the QESKF uncertainty trace, the latest frame of rotation
//! matrices, and a periodic machine-readable status snapshot.

use std::collections::VecDeque;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::fusion::FrameSnapshot;
use crate::types::CalibratedSample;

/// Fixed-capacity scalar series backing one on-screen graph.
#[derive(Clone, Debug)]
pub struct TraceBuffer {
    buf: VecDeque<f64>,
    capacity: usize,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn latest(&self) -> Option<f64> {
        self.buf.back().copied()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.buf.iter().copied()
    }
}

/// Per-frame feed for the renderer.
pub struct ViewFeed {
    pub acc: [TraceBuffer; 3],
    pub mag: [TraceBuffer; 3],
    pub rot: [TraceBuffer; 3],
    pub sigma: TraceBuffer,
    pub frame: Option<FrameSnapshot>,
}

impl ViewFeed {
    pub fn new(capacity: usize) -> Self {
        let traces = || {
            [
                TraceBuffer::new(capacity),
                TraceBuffer::new(capacity),
                TraceBuffer::new(capacity),
            ]
        };
        Self {
            acc: traces(),
            mag: traces(),
            rot: traces(),
            sigma: TraceBuffer::new(capacity),
            frame: None,
        }
    }

    pub fn update(&mut self, sample: &CalibratedSample, frame: FrameSnapshot) {
        for i in 0..3 {
            self.acc[i].push(sample.acc[i]);
            self.mag[i].push(sample.mag[i]);
            self.rot[i].push(sample.rot[i]);
        }
        self.sigma.push(frame.sigma);
        self.frame = Some(frame);
    }
}

/// Snapshot published as JSON for anything watching the tracker from
/// outside the process.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusSnapshot {
    pub timestamp: f64,
    pub samples: u64,
    pub discarded_lines: u64,
    pub sigma: f64,
    pub quaternion: [f64; 4],
    pub recording: Option<String>,
}

impl StatusSnapshot {
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
