//! Benchmark logic
use crate::counters::RunCounters;
use crate::error::ItemError;
use crate::identity::IdentitySource;
use crate::ledger::Ledger;
use crate::reporter::ThroughputReporter;
use crate::submitter::{describe_metrics, SubmissionResult, Submitter};
use crate::transaction;
use ledgerload_core::{IdentityMode, RunConfig, RunReport, WorkItem};
use std::{
    future::Future,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// A configured write-load run against a ledger.
///
/// Nothing happens until the benchmark is awaited. Configure it through [`ConfigurableBenchmark`].
pub struct Benchmark<L> {
    ledger: Arc<L>,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunReport> + Send>>>,
    config: RunConfig,
}

impl<L> Benchmark<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_config(Arc::new(ledger), RunConfig::default())
    }

    pub fn with_config(ledger: Arc<L>, config: RunConfig) -> Self {
        Self {
            ledger,
            runner_fut: None,
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

impl<L> Future for Benchmark<L>
where
    L: Ledger + Send + Sync + 'static,
{
    type Output = RunReport;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let runner = this.runner_fut.get_or_insert_with(|| {
            Box::pin(run_benchmark(this.ledger.clone(), this.config.clone()))
        });
        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableBenchmark: Future<Output = RunReport> + Sized + Send {
    fn total(self, total_count: u64) -> Self;
    fn start_offset(self, start_offset: u64) -> Self;
    fn batch_size(self, batch_size: NonZeroUsize) -> Self;
    fn identity_mode(self, identity_mode: IdentityMode) -> Self;
    fn shared_identity(self) -> Self;
    fn retry_limit(self, retry_limit: NonZeroU32) -> Self;
    fn retry_conflicts(self, retry_conflicts: bool) -> Self;
    fn max_tps(self, max_tps: NonZeroU32) -> Self;
    fn log_path(self, path: impl Into<PathBuf>) -> Self;
    fn no_log(self) -> Self;
}

impl<L> ConfigurableBenchmark for Benchmark<L>
where
    L: Ledger + Send + Sync + 'static,
{
    /// Number of records to write.
    ///
    /// # Example
    /// ```no_run
    /// use ledgerload::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let ledger = HttpLedger::new(&LedgerConfig::default()).unwrap();
    ///     let report = Benchmark::new(ledger).total(1_000).await;
    ///     println!("{report}");
    /// }
    /// ```
    fn total(mut self, total_count: u64) -> Self {
        self.config.total_count = total_count;
        self
    }

    /// Sequence numbers start right after `start_offset`, so runs can be resumed.
    fn start_offset(mut self, start_offset: u64) -> Self {
        self.config.start_offset = start_offset;
        self
    }

    /// Number of records in flight at once. The next batch starts only after every record of
    /// the current one has settled.
    ///
    /// # Example
    /// ```no_run
    /// use ledgerload::prelude::*;
    /// use std::num::NonZeroUsize;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let ledger = HttpLedger::new(&LedgerConfig::default()).unwrap();
    ///     Benchmark::new(ledger)
    ///         .total(10_000)
    ///         .batch_size(NonZeroUsize::new(500).unwrap())
    ///         .await;
    /// }
    /// ```
    fn batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    fn identity_mode(mut self, identity_mode: IdentityMode) -> Self {
        self.config.identity_mode = identity_mode;
        self
    }

    /// Sign every record with one identity derived at the start of the run.
    fn shared_identity(self) -> Self {
        self.identity_mode(IdentityMode::Shared)
    }

    fn retry_limit(mut self, retry_limit: NonZeroU32) -> Self {
        self.config.retry_limit = retry_limit;
        self
    }

    fn retry_conflicts(mut self, retry_conflicts: bool) -> Self {
        self.config.retry_conflicts = retry_conflicts;
        self
    }

    /// Cap submission attempts per second across the whole run.
    ///
    /// # Example
    /// ```no_run
    /// use ledgerload::prelude::*;
    /// use std::num::NonZeroU32;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let ledger = HttpLedger::new(&LedgerConfig::default()).unwrap();
    ///     Benchmark::new(ledger)
    ///         .total(600)
    ///         .max_tps(NonZeroU32::new(50).unwrap())
    ///         .await;
    /// }
    /// ```
    fn max_tps(mut self, max_tps: NonZeroU32) -> Self {
        self.config.max_tps = Some(max_tps);
        self
    }

    fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = Some(path.into());
        self
    }

    /// Do not persist the run summary.
    fn no_log(mut self) -> Self {
        self.config.log_path = None;
        self
    }
}

#[instrument(name="benchmark", skip_all, fields(total=config.total_count, batch_size=config.batch_size.get(), identity_mode=%config.identity_mode))]
pub async fn run_benchmark<L>(ledger: Arc<L>, config: RunConfig) -> RunReport
where
    L: Ledger + Send + Sync + 'static,
{
    info!("Running benchmark with config {:?}", &config);
    if let Err(err) = config.validate() {
        warn!("{err}; the run stops at the last representable sequence number");
    }
    describe_metrics();

    let identities = IdentitySource::new(config.identity_mode).await;
    run_with_identities(ledger, config, identities).await
}

pub(crate) async fn run_with_identities<L>(
    ledger: Arc<L>,
    config: RunConfig,
    identities: IdentitySource,
) -> RunReport
where
    L: Ledger + Send + Sync + 'static,
{
    let start = Instant::now();

    let counters = Arc::new(RunCounters::new());
    let identities = Arc::new(identities);
    let submitter = Submitter::from_config(ledger, &config);

    let plan = config.plan();
    let total_requested = plan.remaining();
    let batch_count = plan.batch_count();

    for (index, batch) in plan.enumerate() {
        let handles: Vec<_> = batch
            .into_iter()
            .map(|item| {
                let sequence = item.sequence;
                let counters = counters.clone();
                let fut = process_item(item, identities.clone(), submitter.clone());
                let settle = async move {
                    match fut.await {
                        Ok(result) => counters.record_success(result.attempts, result.latency),
                        Err(err) => fold_failure(&counters, sequence, &err),
                    }
                };
                (sequence, tokio::spawn(settle.in_current_span()))
            })
            .collect();

        // Every item of the batch settles before the next batch is issued.
        for (sequence, handle) in handles {
            if let Err(err) = handle.await {
                fold_failure(&counters, sequence, &ItemError::Aborted(err.to_string()));
            }
        }

        info!(
            "Batch completed: {}/{total_requested} ({}/{batch_count})",
            counters.settled(),
            index + 1
        );
    }

    let elapsed = start.elapsed();
    let snapshot = counters.snapshot();
    info!(
        "Benchmark complete: {} created, {} failed in {elapsed:?}",
        snapshot.succeeded, snapshot.failed
    );

    ThroughputReporter::from_config(&config)
        .report(&snapshot, elapsed, config.batch_size.get(), total_requested)
        .await
}

async fn process_item<L>(
    item: WorkItem,
    identities: Arc<IdentitySource>,
    submitter: Submitter<L>,
) -> Result<SubmissionResult, ItemError>
where
    L: Ledger + Send + Sync + 'static,
{
    let identity = identities.identity().await?;
    let record = transaction::build(&item.payload, &identity)?;
    trace!("Asset {} signed as {}", item.sequence, record.id());

    let result = submitter.submit(&record).await;
    match result.outcome {
        Ok(()) => Ok(result),
        Err(source) => Err(ItemError::Submit {
            attempts: result.attempts,
            source,
        }),
    }
}

fn fold_failure(counters: &RunCounters, sequence: u64, err: &ItemError) {
    if counters.record_failure(sequence, err.attempts()) {
        error!("First failure of the run, asset {sequence}: {err:?}");
    } else {
        warn!("Asset not created: {sequence}");
    }
}
