use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use mock_ledger::{tps_measure_task, Behavior, MockLedger};
use rand_distr::SkewNormal;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(about = "In-memory ledger node for load testing")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:9984")]
    addr: SocketAddr,

    /// Answer the first N posts with 503.
    #[arg(long, default_value_t = 0)]
    fail_first: u64,

    /// Answer every post with 400.
    #[arg(long)]
    reject_all: bool,

    /// Mean added latency per post, in milliseconds.
    #[arg(long)]
    latency_ms: Option<f64>,

    #[arg(long, default_value_t = 2.)]
    latency_scale_ms: f64,

    #[arg(long, default_value_t = 1.)]
    latency_shape: f64,

    /// Posts beyond this rate get 429.
    #[arg(long)]
    max_tps: Option<NonZeroU32>,

    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_env_filter("mock_ledger=debug,tower_http=info")
        .init();

    let cli = Cli::parse();

    let latency = match cli.latency_ms {
        Some(location) => match SkewNormal::new(location, cli.latency_scale_ms, cli.latency_shape) {
            Ok(distr) => Some(distr),
            Err(err) => {
                error!("Invalid latency distribution: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(addr) = cli.metrics_addr {
        if let Err(err) = PrometheusBuilder::new().with_http_listener(addr).install() {
            error!("Error installing metrics exporter: {err}");
            return ExitCode::FAILURE;
        }
    }

    let ledger = Arc::new(MockLedger::new(Behavior {
        fail_first: cli.fail_first,
        reject_all: cli.reject_all,
        latency,
        max_tps: cli.max_tps,
    }));

    tokio::spawn(tps_measure_task());

    info!("Mock ledger listening on {}", cli.addr);
    match mock_ledger::run(cli.addr, ledger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Mock ledger failed: {err}");
            ExitCode::FAILURE
        }
    }
}
