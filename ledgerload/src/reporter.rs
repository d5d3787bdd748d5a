//! Run summaries
use crate::counters::CounterSnapshot;
use crate::error::ReportError;
use ledgerload_core::{throughput, IdentityMode, LatencySet, RunConfig, RunReport};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Resolve the local UTC offset used to date run summaries.
///
/// The offset can only be read while the process is single-threaded, so binaries call this
/// before starting their runtime. Without it, summaries are dated in UTC.
pub fn capture_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

/// What happened to the log file when a summary was persisted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Persisted {
    Created,
    Appended,
}

/// Turns the final counters of a run into a [`RunReport`] and appends it to the log file.
#[derive(Clone, Debug)]
pub struct ThroughputReporter {
    sink: Option<PathBuf>,
    identity_mode: IdentityMode,
}

impl ThroughputReporter {
    pub fn new(sink: Option<PathBuf>, identity_mode: IdentityMode) -> Self {
        Self {
            sink,
            identity_mode,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.log_path.clone(), config.identity_mode)
    }

    pub fn sink(&self) -> Option<&Path> {
        self.sink.as_deref()
    }

    pub fn summarize(
        &self,
        snapshot: &CounterSnapshot,
        elapsed: Duration,
        batch_size: usize,
        total_requested: u64,
        finished_at: OffsetDateTime,
    ) -> RunReport {
        let mut latencies = LatencySet::new();
        latencies.extend(&snapshot.latencies);

        RunReport {
            started_at: finished_at - elapsed,
            finished_at,
            batch_size,
            identity_mode: self.identity_mode,
            total_requested,
            total_succeeded: snapshot.succeeded,
            total_failed: snapshot.failed,
            total_attempts: snapshot.attempts,
            first_error_sequence: snapshot.first_error_sequence,
            elapsed,
            throughput: throughput(snapshot.succeeded, elapsed),
            latency_p50: latencies.latency(0.5),
            latency_p90: latencies.latency(0.9),
            latency_p99: latencies.latency(0.99),
        }
    }

    /// Append `report` to the sink, creating the file first if needed.
    ///
    /// Returns `None` when no sink is configured.
    pub fn persist(&self, report: &RunReport) -> Result<Option<Persisted>, ReportError> {
        let Some(path) = &self.sink else {
            return Ok(None);
        };

        let write = || -> std::io::Result<Persisted> {
            let (mut file, persisted) = open_sink(path)?;
            file.write_all(report.to_string().as_bytes())?;
            file.flush()?;
            Ok(persisted)
        };
        write().map(Some).map_err(|source| ReportError {
            path: path.clone(),
            source,
        })
    }

    /// Summarize and persist. Failing to write the log never fails the run.
    pub async fn report(
        &self,
        snapshot: &CounterSnapshot,
        elapsed: Duration,
        batch_size: usize,
        total_requested: u64,
    ) -> RunReport {
        let finished_at = OffsetDateTime::now_utc().to_offset(local_offset());
        let report = self.summarize(snapshot, elapsed, batch_size, total_requested, finished_at);

        let reporter = self.clone();
        let summary = report.clone();
        let persisted = tokio::task::spawn_blocking(move || reporter.persist(&summary)).await;

        match persisted {
            Ok(Ok(Some(Persisted::Created))) => info!("Created {}", self.display_sink()),
            Ok(Ok(Some(Persisted::Appended))) => info!("Appended to {}", self.display_sink()),
            Ok(Ok(None)) => debug!("No log file configured"),
            Ok(Err(err)) => error!("{err}"),
            Err(err) => error!("Writing {} did not complete: {err}", self.display_sink()),
        }

        report
    }

    fn display_sink(&self) -> String {
        self.sink
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default()
    }
}

/// Create the log, or open it for appending when it already exists.
fn open_sink(path: &Path) -> std::io::Result<(File, Persisted)> {
    match OpenOptions::new().append(true).create_new(true).open(path) {
        Ok(file) => Ok((file, Persisted::Created)),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            let file = OpenOptions::new().append(true).open(path)?;
            Ok((file, Persisted::Appended))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn snapshot() -> CounterSnapshot {
        CounterSnapshot {
            succeeded: 4,
            failed: 1,
            attempts: 7,
            first_error_sequence: Some(3),
            latencies: vec![Duration::from_millis(10); 4],
        }
    }

    #[test]
    fn summary_reflects_counters() {
        let reporter = ThroughputReporter::new(None, IdentityMode::Shared);
        let finished_at = datetime!(2024-05-01 10:00:02 UTC);
        let report = reporter.summarize(&snapshot(), Duration::from_secs(2), 2, 5, finished_at);

        assert_eq!(report.started_at, datetime!(2024-05-01 10:00:00 UTC));
        assert_eq!(report.total_succeeded, 4);
        assert_eq!(report.total_failed, 1);
        assert_eq!(report.total_attempts, 7);
        assert_eq!(report.first_error_sequence, Some(3));
        assert_eq!(report.throughput, 2.);
        assert_eq!(report.identity_mode, IdentityMode::Shared);
        assert_eq!(report.latency_p50, Duration::from_millis(10));
    }

    #[test]
    fn same_counters_give_the_same_summary() {
        let reporter = ThroughputReporter::new(None, IdentityMode::PerItem);
        let finished_at = datetime!(2024-05-01 10:00:07 UTC);
        let elapsed = Duration::from_millis(7_300);

        let first = reporter.summarize(&snapshot(), elapsed, 2, 5, finished_at);
        let second = reporter.summarize(&snapshot(), elapsed, 2, 5, finished_at);

        assert_eq!(first.throughput.to_bits(), second.throughput.to_bits());
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn report_persists_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throughput.log");
        let reporter = ThroughputReporter::new(Some(path.clone()), IdentityMode::PerItem);

        let report = reporter.report(&snapshot(), Duration::from_secs(2), 2, 5).await;
        assert_eq!(report.throughput, 2.);
        assert_eq!(report.finished_at.offset(), local_offset());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, report.to_string());
    }

    #[test]
    fn empty_run_reports_zero() {
        let reporter = ThroughputReporter::new(None, IdentityMode::PerItem);
        let report = reporter.summarize(
            &CounterSnapshot::default(),
            Duration::ZERO,
            200,
            0,
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(report.throughput, 0.);
        assert_eq!(report.latency_p99, Duration::ZERO);
    }

    #[test]
    fn log_is_created_then_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throughput.log");
        let reporter = ThroughputReporter::new(Some(path.clone()), IdentityMode::PerItem);
        let report = reporter.summarize(
            &snapshot(),
            Duration::from_secs(1),
            2,
            5,
            datetime!(2024-05-01 10:00:00 UTC),
        );

        assert_eq!(reporter.persist(&report).unwrap(), Some(Persisted::Created));
        assert_eq!(reporter.persist(&report).unwrap(), Some(Persisted::Appended));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("Total assets created: 4").count(), 2);
        assert!(contents.starts_with("\nDate: 2024-05-01 10:00:00 +00:00"));
    }

    #[test]
    fn unwritable_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("throughput.log");
        let reporter = ThroughputReporter::new(Some(path.clone()), IdentityMode::PerItem);
        let report = reporter.summarize(
            &snapshot(),
            Duration::from_secs(1),
            2,
            5,
            OffsetDateTime::UNIX_EPOCH,
        );

        let err = reporter.persist(&report).unwrap_err();
        assert_eq!(err.path, path);
        assert!(reporter.sink().is_some());
    }
}
