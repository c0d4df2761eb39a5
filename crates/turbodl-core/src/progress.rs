//! Progress reporting for downloads (bytes done, ETA, rate).
//!
//! A [`Progress`] is shared between the caller and the coordinator. Fetchers
//! add to the byte counter as data lands in staging (and take it back when an
//! attempt is thrown away), so `bytes_done` may briefly go down on retries.
//! Callers poll [`Progress::stats`] at whatever rate suits them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct Progress {
    total_bytes: AtomicU64,
    bytes_done: AtomicU64,
    chunk_count: AtomicUsize,
    chunks_done: AtomicUsize,
    started: OnceLock<Instant>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the transfer size and chunk count are known.
    pub(crate) fn begin(&self, total_bytes: u64, chunk_count: usize) {
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
        self.chunk_count.store(chunk_count, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
        self.chunks_done.store(0, Ordering::Relaxed);
        let _ = self.started.set(Instant::now());
    }

    /// Byte counter fetchers add to.
    pub(crate) fn bytes(&self) -> &AtomicU64 {
        &self.bytes_done
    }

    pub(crate) fn chunk_finished(&self) {
        self.chunks_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Current snapshot; all zeros before the transfer has started.
    pub fn stats(&self) -> ProgressStats {
        ProgressStats {
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            elapsed_secs: self
                .started
                .get()
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            chunks_done: self.chunks_done.load(Ordering::Relaxed),
            chunk_count: self.chunk_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of download progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes written to staging so far.
    pub bytes_done: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Elapsed time since the first chunk started (seconds).
    pub elapsed_secs: f64,
    /// Number of chunks completed.
    pub chunks_done: usize,
    /// Total number of chunks.
    pub chunk_count: usize,
}

impl ProgressStats {
    /// Total download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
