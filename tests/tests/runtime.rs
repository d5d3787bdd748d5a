mod utils;
#[allow(unused)]
use utils::*;

use ledgerload_core::{IdentityMode, LedgerConfig, RunConfig};
use ledgerload_runtime::{LedgerRuntime, Mode, RuntimeError, Settings};
use mock_ledger::Behavior;
use std::num::NonZeroUsize;

#[tokio::test]
#[ntest::timeout(30_000)]
async fn runtime_runs_a_benchmark() {
    let (url, ledger) = mock(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("throughput.log");

    let settings = Settings {
        run: RunConfig {
            total_count: 5,
            batch_size: NonZeroUsize::new(2).unwrap(),
            identity_mode: IdentityMode::Shared,
            log_path: Some(log_path.clone()),
            ..RunConfig::default()
        },
        ledger: LedgerConfig::new(&url),
        ..Settings::default()
    };

    let report = LedgerRuntime::new()
        .settings(settings)
        .mode(Mode::Bench)
        .run()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.total_succeeded, 5);
    assert_eq!(report.batch_size, 2);
    assert_eq!(ledger.committed(), 5);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("Total assets created: 5"));
    assert!(log.contains("Identity mode: shared"));
}

#[tokio::test]
async fn startup_errors_are_returned() {
    init();

    let settings = Settings {
        ledger: LedgerConfig::new(""),
        ..Settings::default()
    };
    let res = LedgerRuntime::new().settings(settings).run().await;
    assert!(matches!(res, Err(RuntimeError::Config(_))));

    let settings = Settings {
        run: RunConfig {
            start_offset: u64::MAX,
            total_count: 1,
            ..RunConfig::default()
        },
        ..Settings::default()
    };
    let res = LedgerRuntime::new().settings(settings).run().await;
    assert!(matches!(res, Err(RuntimeError::Config(_))));
}
