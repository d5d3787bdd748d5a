use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

/// Run-wide tallies shared by every in-flight item.
///
/// Updates are lock-free; each item touches them exactly once when it settles.
pub(crate) struct RunCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
    first_error: OnceLock<u64>,
    latency: AtomicBucket<Duration>,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    pub attempts: u64,
    pub first_error_sequence: Option<u64>,
    /// Per-item submission latency of the items that succeeded.
    pub latencies: Vec<Duration>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self {
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            first_error: OnceLock::new(),
            latency: AtomicBucket::new(),
        }
    }

    pub fn record_success(&self, attempts: u32, latency: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.attempts.fetch_add(attempts as u64, Ordering::Relaxed);
        self.latency.push(latency);
    }

    /// Returns `true` only for the first failure of the run.
    pub fn record_failure(&self, sequence: u64, attempts: u32) -> bool {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.attempts.fetch_add(attempts as u64, Ordering::Relaxed);
        self.first_error.set(sequence).is_ok()
    }

    pub fn settled(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut latencies = vec![];
        self.latency.data_with(|block| latencies.extend_from_slice(block));

        CounterSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            first_error_sequence: self.first_error.get().copied(),
            latencies,
        }
    }
}
