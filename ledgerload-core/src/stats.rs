use crate::IdentityMode;
use humantime::format_duration;
use std::fmt;
use std::time::Duration;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
);

/// Summary of a completed benchmark run.
///
/// Built once all batches have settled, never updated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub batch_size: usize,
    pub identity_mode: IdentityMode,
    pub total_requested: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    /// Submission attempts across all items, retries included.
    pub total_attempts: u64,
    pub first_error_sequence: Option<u64>,
    pub elapsed: Duration,
    /// Successful records per second of wall-clock time.
    pub throughput: f64,
    pub latency_p50: Duration,
    pub latency_p90: Duration,
    pub latency_p99: Duration,
}

impl RunReport {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requested == 0 {
            0.
        } else {
            self.total_failed as f64 / self.total_requested as f64
        }
    }
}

/// Successful records per second. Zero when nothing succeeded or no time elapsed.
pub fn throughput(succeeded: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if succeeded == 0 || secs <= 0. {
        0.
    } else {
        succeeded as f64 / secs
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self.finished_at.format(DATE_FORMAT).map_err(|_| fmt::Error)?;

        writeln!(f)?;
        writeln!(f, "Date: {date}")?;
        writeln!(f, "Total assets created: {}", self.total_succeeded)?;
        writeln!(
            f,
            "Total assets failed: {} (of {} requested, {} attempts)",
            self.total_failed, self.total_requested, self.total_attempts
        )?;
        writeln!(
            f,
            "Total time taken: {:.3} seconds ({})",
            self.elapsed_secs(),
            format_duration(Duration::from_millis(self.elapsed.as_millis() as u64)),
        )?;
        writeln!(f, "Throughput: {:.3} assets per second", self.throughput)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Identity mode: {}", self.identity_mode)?;
        writeln!(
            f,
            "Latency: p50={:?}, p90={:?}, p99={:?}",
            self.latency_p50, self.latency_p90, self.latency_p99,
        )?;
        if let Some(sequence) = self.first_error_sequence {
            writeln!(f, "First error at asset: {sequence}")?;
        }
        Ok(())
    }
}
