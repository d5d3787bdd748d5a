use crate::error::SubmitError;
use crate::ledger::Ledger;
use crate::transaction::SignedRecord;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[cfg(feature = "metrics")]
use ledgerload_core::SUBMISSION_LABELS;
use ledgerload_core::{RunConfig, RETRY_LIMIT};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Decides whether a failed attempt is followed by another one.
///
/// Attempts are immediate; there is no delay between them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: NonZeroU32,
    retry_conflicts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RETRY_LIMIT, false)
    }
}

impl RetryPolicy {
    pub fn new(limit: NonZeroU32, retry_conflicts: bool) -> Self {
        Self {
            limit,
            retry_conflicts,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, error: &SubmitError) -> bool {
        attempt < self.limit.get() && (self.retry_conflicts || !error.is_conflict())
    }
}

/// Outcome of submitting one record, retries included.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub attempts: u32,
    /// Time spent inside the ledger calls, summed over attempts.
    pub latency: Duration,
    pub outcome: Result<(), SubmitError>,
}

impl SubmissionResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Posts signed records to a [`Ledger`], retrying per its [`RetryPolicy`].
pub struct Submitter<L> {
    ledger: Arc<L>,
    policy: RetryPolicy,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl<L> Clone for Submitter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            policy: self.policy,
            limiter: self.limiter.clone(),
        }
    }
}

impl<L: Ledger + Sync> Submitter<L> {
    pub fn new(ledger: Arc<L>, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            policy,
            limiter: None,
        }
    }

    pub fn from_config(ledger: Arc<L>, config: &RunConfig) -> Self {
        let submitter = Self::new(
            ledger,
            RetryPolicy::new(config.retry_limit, config.retry_conflicts),
        );
        match config.max_tps {
            Some(max_tps) => submitter.with_rate_limit(max_tps),
            None => submitter,
        }
    }

    /// Cap submission attempts across every clone of this submitter.
    pub fn with_rate_limit(mut self, max_tps: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(rate_limiter(max_tps)));
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Submit `record`, re-sending the same signed body until it commits or the policy gives up.
    pub async fn submit(&self, record: &SignedRecord) -> SubmissionResult {
        let mut attempts = 0;
        let mut latency = Duration::ZERO;

        loop {
            attempts += 1;

            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let start = Instant::now();
            let res = Ledger::post_commit(self.ledger.as_ref(), record).await;
            let elapsed = start.elapsed();
            latency += elapsed;
            record_attempt(&res, elapsed);

            match res {
                Ok(()) => {
                    break SubmissionResult {
                        attempts,
                        latency,
                        outcome: Ok(()),
                    }
                }
                Err(err) if self.policy.should_retry(attempts, &err) => {
                    debug!("Retrying {} after attempt {attempts}", record.id());
                    #[cfg(feature = "metrics")]
                    metrics::counter!(SUBMISSION_LABELS.retry).increment(1);
                }
                Err(err) => {
                    break SubmissionResult {
                        attempts,
                        latency,
                        outcome: Err(err),
                    }
                }
            }
        }
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    metrics::describe_counter!(SUBMISSION_LABELS.success, "Committed submission attempts");
    metrics::describe_counter!(SUBMISSION_LABELS.error, "Failed submission attempts");
    metrics::describe_counter!(SUBMISSION_LABELS.retry, "Submission attempts that were retried");
    metrics::describe_histogram!(
        SUBMISSION_LABELS.latency,
        metrics::Unit::Nanoseconds,
        "Latency of a single submission attempt"
    );
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn describe_metrics() {}

#[cfg(feature = "metrics")]
fn record_attempt(res: &Result<(), SubmitError>, elapsed: Duration) {
    metrics::histogram!(SUBMISSION_LABELS.latency).record(elapsed.as_nanos() as f64);
    if res.is_ok() {
        metrics::counter!(SUBMISSION_LABELS.success).increment(1);
    } else {
        metrics::counter!(SUBMISSION_LABELS.error).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
fn record_attempt(_res: &Result<(), SubmitError>, _elapsed: Duration) {}

fn rate_limiter(max_tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(max_tps).allow_burst(NonZeroU32::MIN))
}
