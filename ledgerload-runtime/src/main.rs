use ledgerload_runtime::{LedgerRuntime, RuntimeError};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "ledgerload=info,ledgerload_runtime=info,tower_http=info";

fn main() -> ExitCode {
    // Must run before any thread is spawned.
    ledgerload::reporter::capture_local_offset();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let res = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RuntimeError::Start)
        .and_then(|rt| rt.block_on(LedgerRuntime::new().with_args().run()));

    match res {
        Ok(Some(report)) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
