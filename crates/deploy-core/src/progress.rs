use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Byte counters for the transfer currently in flight.
///
/// Single writer (the owning pipeline's transport), any number of readers.
/// Reads never block; the counters are display-only and do not affect
/// correctness.
#[derive(Debug, Default)]
pub struct TransferProgress {
    total: AtomicU64,
    sent: AtomicU64,
    started: Mutex<Option<Instant>>,
}

impl TransferProgress {
    /// Arm the counters for a new transfer of `total_bytes`.
    pub fn begin(&self, total_bytes: u64) {
        self.total.store(total_bytes, Ordering::Release);
        self.sent.store(0, Ordering::Release);
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn add(&self, bytes: u64) {
        self.sent.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Snapshot of the in-flight transfer, or `None` before the first
    /// transfer starts.
    pub fn sample(&self) -> Option<ProgressSample> {
        let started = (*self.started.lock().ok()?)?;
        Some(ProgressSample {
            sent_bytes: self.sent.load(Ordering::Acquire),
            total_bytes: self.total.load(Ordering::Acquire),
            elapsed: started.elapsed(),
        })
    }
}

/// Ephemeral view of a transfer, derived at read time.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSample {
    pub sent_bytes: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl ProgressSample {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.sent_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    pub fn rate_mb_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.sent_bytes as f64 / 1_000_000.0 / secs
    }
}
