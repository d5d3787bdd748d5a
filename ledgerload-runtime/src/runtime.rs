//! Default ledgerload runtime
//!
//! Resolves settings from every source, then either runs a benchmark or serves the REST facade.
use crate::{config::Settings, error::RuntimeError, server};
use clap::{Args, Parser, Subcommand};
use ledgerload::prelude::*;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};

#[derive(Parser, Debug)]
#[command(name = "ledgerload", version, about = "Batched write-load generation for a ledger")]
struct LedgerCli {
    /// TOML config file.
    #[arg(short, long, env = "LEDGERLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the ledger's HTTP API.
    #[arg(short, long, env = "LEDGERLOAD_LEDGER_URL")]
    ledger: Option<String>,

    /// Per-request timeout towards the ledger, e.g. `30s`.
    #[arg(long, env = "LEDGERLOAD_REQUEST_TIMEOUT", value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "LEDGERLOAD_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Write records in batches and report throughput (default).
    Bench(BenchArgs),
    /// Serve the single-record REST facade.
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
struct BenchArgs {
    /// Number of records to write.
    #[arg(short = 'n', long, env = "LEDGERLOAD_TOTAL")]
    total: Option<u64>,

    /// Sequence numbers start after this offset.
    #[arg(short = 'o', long, env = "LEDGERLOAD_START_OFFSET")]
    start_offset: Option<u64>,

    #[arg(short, long, env = "LEDGERLOAD_BATCH_SIZE")]
    batch_size: Option<NonZeroUsize>,

    /// `per-item` or `shared`.
    #[arg(short, long, env = "LEDGERLOAD_IDENTITY_MODE")]
    identity_mode: Option<IdentityMode>,

    #[arg(long, env = "LEDGERLOAD_RETRY_LIMIT")]
    retry_limit: Option<NonZeroU32>,

    /// Retry conflicts (double spends, duplicates) like any other failure.
    #[arg(long, env = "LEDGERLOAD_RETRY_CONFLICTS")]
    retry_conflicts: bool,

    #[arg(long, env = "LEDGERLOAD_MAX_TPS")]
    max_tps: Option<NonZeroU32>,

    /// File the run summary is appended to.
    #[arg(long, env = "LEDGERLOAD_LOG_PATH", conflicts_with = "no_log")]
    log_path: Option<PathBuf>,

    /// Do not persist the run summary.
    #[arg(long)]
    no_log: bool,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    #[arg(short, long, env = "LEDGERLOAD_PORT")]
    port: Option<u16>,
}

/// What the runtime does once settings are resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Bench,
    Serve,
}

/// Default ledgerload runtime.
///
/// # Example
///
/// ```no_run
/// use ledgerload_runtime::LedgerRuntime;
///
/// #[tokio::main]
/// async fn main() {
///     let report = LedgerRuntime::new().with_args().run().await;
/// }
/// ```
#[derive(Debug, Default)]
pub struct LedgerRuntime {
    settings: Settings,
    mode: Mode,
    cli: Option<LedgerCli>,
}

impl LedgerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the command line (and `LEDGERLOAD_*` environment variables).
    ///
    /// # Example
    /// ```ignore
    /// $ ledgerload --ledger http://localhost:9984/api/v1/ bench -n 10000 -b 200
    /// $ ledgerload --config ledgerload.toml bench --identity-mode shared
    /// $ ledgerload serve -p 3000
    /// ```
    pub fn with_args(mut self) -> Self {
        self.cli = Some(LedgerCli::parse());
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Merge every settings source. Command line and environment win over the config file.
    pub fn resolve(self) -> Result<(Settings, Mode), RuntimeError> {
        let Some(cli) = self.cli else {
            return Ok((self.settings, self.mode));
        };

        let mut settings = match &cli.config {
            Some(path) => Settings::from_file(path)?,
            None => self.settings,
        };

        if let Some(url) = cli.ledger {
            settings.ledger.url = url;
        }
        if let Some(timeout) = cli.request_timeout {
            settings.ledger.request_timeout = Some(timeout);
        }
        if let Some(addr) = cli.metrics_addr {
            settings.metrics_addr = Some(addr);
        }

        let mode = match cli.command {
            Some(CliCommand::Serve(args)) => {
                if let Some(port) = args.port {
                    settings.server.port = port;
                }
                Mode::Serve
            }
            Some(CliCommand::Bench(args)) => {
                args.apply(&mut settings);
                Mode::Bench
            }
            None => Mode::Bench,
        };

        Ok((settings, mode))
    }

    /// Run to completion. Returns the report of a benchmark; serving only returns on error.
    ///
    /// Only startup failures are errors. Failed records are part of the report.
    #[instrument(name = "ledgerload", skip_all)]
    pub async fn run(self) -> Result<Option<RunReport>, RuntimeError> {
        let (settings, mode) = self.resolve()?;
        settings.validate()?;

        if let Some(addr) = settings.metrics_addr {
            install_metrics(addr)?;
        }

        let ledger = HttpLedger::new(&settings.ledger)?;
        info!("Using ledger at {}", ledger.base_url());

        match mode {
            Mode::Bench => {
                let run = &settings.run;
                info!(
                    "Writing {} records starting after {} in batches of {} ({} identities)",
                    run.total_count, run.start_offset, run.batch_size, run.identity_mode
                );
                let report = Benchmark::with_config(Arc::new(ledger), settings.run).await;
                Ok(Some(report))
            }
            Mode::Serve => {
                server::serve(settings.server.port, ledger).await?;
                Ok(None)
            }
        }
    }
}

impl BenchArgs {
    fn apply(self, settings: &mut Settings) {
        let run = &mut settings.run;
        if let Some(total) = self.total {
            run.total_count = total;
        }
        if let Some(start_offset) = self.start_offset {
            run.start_offset = start_offset;
        }
        if let Some(batch_size) = self.batch_size {
            run.batch_size = batch_size;
        }
        if let Some(identity_mode) = self.identity_mode {
            run.identity_mode = identity_mode;
        }
        if let Some(retry_limit) = self.retry_limit {
            run.retry_limit = retry_limit;
        }
        if self.retry_conflicts {
            run.retry_conflicts = true;
        }
        if self.max_tps.is_some() {
            run.max_tps = self.max_tps;
        }
        if self.log_path.is_some() {
            run.log_path = self.log_path;
        }
        if self.no_log {
            run.log_path = None;
        }
    }
}

fn install_metrics(addr: SocketAddr) -> Result<(), RuntimeError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| RuntimeError::Metrics(err.to_string()))?;
    info!("Serving metrics on {addr}");
    Ok(())
}
