use mock_ledger::{Behavior, MockLedger};
use std::sync::{Arc, OnceLock};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_env_filter("ledgerload=debug,ledgerload_runtime=debug,mock_ledger=debug")
            .with_test_writer()
            .init();
    });
}

/// Start a mock ledger and return the base URL of its API.
#[allow(unused)]
pub async fn mock(behavior: Behavior) -> (String, Arc<MockLedger>) {
    init();
    let (addr, ledger) = mock_ledger::spawn(behavior).await.unwrap();
    (mock_ledger::api_url(addr), ledger)
}
