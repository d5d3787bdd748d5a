use pdatastructs::tdigest::{TDigest, K1};
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// A single unit of work: one record to be written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub sequence: u64,
    pub payload: Value,
}

impl WorkItem {
    pub fn new(sequence: u64, payload: Value) -> Self {
        Self { sequence, payload }
    }

    /// Work item carrying the default name/description payload for `sequence`.
    pub fn synthesize(sequence: u64) -> Self {
        Self::new(
            sequence,
            json!({
                "name": format!("Asset {sequence}"),
                "description": format!("This is asset number {sequence} stored in BigchainDB"),
            }),
        )
    }
}

/// Iterator over the consecutive batches of a run.
///
/// Sequence numbers run from `start_offset + 1` through `start_offset + total_count`; every
/// batch holds `batch_size` items except possibly the last.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    next: u64,
    end: u64,
    batch_size: NonZeroUsize,
}

impl WorkPlan {
    pub fn new(start_offset: u64, total_count: u64, batch_size: NonZeroUsize) -> Self {
        Self {
            next: start_offset,
            end: start_offset.saturating_add(total_count),
            batch_size,
        }
    }

    /// Number of items not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }

    pub fn batch_count(&self) -> u64 {
        self.remaining().div_ceil(self.batch_size.get() as u64)
    }
}

impl Iterator for WorkPlan {
    type Item = Vec<WorkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let len = self.remaining().min(self.batch_size.get() as u64);
        let batch = (self.next + 1..=self.next + len)
            .map(WorkItem::synthesize)
            .collect();
        self.next += len;
        Some(batch)
    }
}

/// Latency distribution of the submissions of a run.
#[derive(Debug, Clone)]
pub struct LatencySet {
    latency: TDigest<K1>,
    count: usize,
}

impl Default for LatencySet {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencySet {
    pub fn new() -> Self {
        Self {
            latency: default_tdigest(),
            count: 0,
        }
    }

    pub fn push(&mut self, latency: Duration) {
        self.latency.insert(latency.as_secs_f64());
        self.count += 1;
    }

    pub fn extend(&mut self, latencies: &[Duration]) {
        for latency in latencies {
            self.push(*latency);
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn latency(&self, quantile: f64) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);

        // TDigest can hand back NaN for tiny sample counts.
        let secs = if secs.is_finite() && secs >= 0. {
            secs
        } else {
            error!("Non-finite latency quantile {quantile}; reporting zero.");
            0.
        };

        Duration::from_secs_f64(secs)
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
