//! Download progress snapshots

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked after every chunk written
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Point-in-time view of a running retrieval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub written: u64,
    /// 0 when the size is unknown
    pub declared: u64,
    pub elapsed: Duration,
}

impl Progress {
    /// Percentage complete, None when the size is unknown
    pub fn percent(&self) -> Option<u8> {
        if self.declared == 0 {
            return None;
        }
        Some((self.written.saturating_mul(100) / self.declared).min(100) as u8)
    }

    /// Average throughput in bytes per second
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.written as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated time left at the average rate
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if self.declared == 0 || rate <= 0.0 {
            return None;
        }
        let remaining = self.declared.saturating_sub(self.written) as f64;
        Some(Duration::from_secs_f64(remaining / rate))
    }
}

/// Accumulates bytes written for one retrieval
pub(crate) struct ProgressTracker {
    started: Instant,
    written: u64,
    declared: u64,
}

impl ProgressTracker {
    pub(crate) fn new(declared: u64) -> Self {
        ProgressTracker {
            started: Instant::now(),
            written: 0,
            declared,
        }
    }

    pub(crate) fn advance(&mut self, bytes: usize) -> Progress {
        self.written += bytes as u64;
        self.snapshot()
    }

    pub(crate) fn snapshot(&self) -> Progress {
        Progress {
            written: self.written,
            declared: self.declared,
            elapsed: self.started.elapsed(),
        }
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }
}

/// Format a byte count with binary units ("1.50 MB")
pub fn human_readable(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} {}", size, UNITS[UNITS.len() - 1])
}
