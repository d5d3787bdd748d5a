mod utils;
#[allow(unused)]
use utils::*;

use ledgerload::prelude::*;
use ledgerload_core::LedgerConfig;
use mock_ledger::Behavior;
use std::collections::HashSet;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

fn http(url: &str) -> HttpLedger {
    HttpLedger::new(&LedgerConfig::new(url)).unwrap()
}

fn batches(batch_size: usize) -> NonZeroUsize {
    NonZeroUsize::new(batch_size).unwrap()
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn every_record_is_committed() {
    let (url, ledger) = mock(Behavior::default()).await;

    let report = Benchmark::new(http(&url))
        .total(6)
        .batch_size(batches(4))
        .no_log()
        .await;

    assert_eq!(report.total_requested, 6);
    assert_eq!(report.total_succeeded, 6);
    assert_eq!(report.total_failed, 0);
    assert_eq!(report.first_error_sequence, None);
    assert_eq!(ledger.committed(), 6);
    assert_eq!(ledger.posts(), 6);
    assert!(report.throughput > 0.);
    assert!(report.latency_p99 >= report.latency_p50);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn unavailable_ledger_is_retried() {
    let (url, ledger) = mock(Behavior {
        fail_first: 2,
        ..Behavior::default()
    })
    .await;

    let report = Benchmark::new(http(&url))
        .total(3)
        .batch_size(batches(1))
        .no_log()
        .await;

    assert_eq!(report.total_succeeded, 3);
    assert_eq!(report.total_attempts, 5);
    assert_eq!(ledger.posts(), 5);
    assert_eq!(ledger.committed(), 3);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn rejecting_ledger_fails_every_record() {
    let (url, ledger) = mock(Behavior {
        reject_all: true,
        ..Behavior::default()
    })
    .await;

    let report = Benchmark::new(http(&url))
        .total(3)
        .batch_size(batches(2))
        .no_log()
        .await;

    assert_eq!(report.total_succeeded, 0);
    assert_eq!(report.total_failed, 3);
    assert_eq!(report.total_attempts, 9);
    assert_eq!(report.first_error_sequence, Some(1));
    assert_eq!(report.throughput, 0.);
    assert_eq!(ledger.posts(), 9);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn unreachable_ledger_still_reports() {
    init();

    let report = Benchmark::new(http("http://127.0.0.1:9/api/v1/"))
        .total(2)
        .retry_limit(NonZeroU32::new(2).unwrap())
        .no_log()
        .await;

    assert_eq!(report.total_failed, 2);
    assert_eq!(report.total_attempts, 4);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn shared_identity_owns_every_record() {
    let (url, _ledger) = mock(Behavior::default()).await;
    let client = http(&url);

    let report = Benchmark::new(client.clone())
        .total(4)
        .start_offset(40)
        .shared_identity()
        .no_log()
        .await;
    assert_eq!(report.total_succeeded, 4);

    let assets = client.search_assets("this is asset number").await.unwrap();
    assert_eq!(assets.len(), 4);

    let mut owners = HashSet::new();
    for asset in &assets {
        let id = asset["id"].as_str().unwrap();
        let tx = client.get_transaction(id).await.unwrap();
        owners.insert(tx["outputs"][0]["public_keys"][0].as_str().unwrap().to_string());
        let name = tx["asset"]["data"]["name"].as_str().unwrap();
        assert!(["Asset 41", "Asset 42", "Asset 43", "Asset 44"].contains(&name));
    }
    assert_eq!(owners.len(), 1);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn summaries_are_appended_to_the_log() {
    let (url, _ledger) = mock(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("throughput.log");

    for offset in [0, 100] {
        Benchmark::new(http(&url))
            .total(2)
            .start_offset(offset)
            .log_path(&path)
            .await;
    }

    let log = std::fs::read_to_string(&path).unwrap();
    assert_eq!(log.matches("Date: ").count(), 2);
    assert_eq!(log.matches("Total assets created: 2").count(), 2);
    assert_eq!(log.matches("Batch size: 200").count(), 2);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn capacity_limit_is_respected_with_max_tps() {
    let (url, ledger) = mock(Behavior {
        max_tps: NonZeroU32::new(10),
        ..Behavior::default()
    })
    .await;

    let report = Benchmark::with_config(
        Arc::new(http(&url)),
        RunConfig {
            total_count: 5,
            max_tps: NonZeroU32::new(5),
            log_path: None,
            ..RunConfig::default()
        },
    )
    .await;

    assert_eq!(report.total_succeeded, 5);
    assert_eq!(ledger.posts(), 5);
    assert!(report.elapsed >= Duration::from_millis(750));
}
