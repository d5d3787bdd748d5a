use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ledgerload::error::InvalidTransaction;
use ledgerload::transaction;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand::Rng;
use rand_distr::SkewNormal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, info, warn};

/// How the mock misbehaves.
#[derive(Clone, Debug, Default)]
pub struct Behavior {
    /// Answer the first `fail_first` posts with 503.
    pub fail_first: u64,
    /// Answer every post with 400.
    pub reject_all: bool,
    /// Added latency per post, in milliseconds.
    pub latency: Option<SkewNormal<f64>>,
    /// Posts beyond this rate are answered with 429.
    pub max_tps: Option<NonZeroU32>,
}

#[derive(Default)]
struct Store {
    transactions: HashMap<String, Value>,
    spent: HashSet<(String, u64)>,
}

/// In-memory ledger speaking the node's HTTP API under `/api/v1/`.
pub struct MockLedger {
    behavior: Behavior,
    limiter: Option<DefaultDirectRateLimiter>,
    posts: AtomicU64,
    store: Mutex<Store>,
}

impl MockLedger {
    pub fn new(behavior: Behavior) -> Self {
        let limiter = behavior.max_tps.map(|tps| RateLimiter::direct(Quota::per_second(tps)));
        Self {
            behavior,
            limiter,
            posts: AtomicU64::new(0),
            store: Mutex::new(Store::default()),
        }
    }

    /// Every post received, including the refused ones.
    pub fn posts(&self) -> u64 {
        self.posts.load(Ordering::Relaxed)
    }

    pub fn committed(&self) -> usize {
        self.store().transactions.len()
    }

    pub fn transaction(&self, id: &str) -> Option<Value> {
        self.store().transactions.get(id).cloned()
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latency(&self) -> Option<Duration> {
        let distr = self.behavior.latency.as_ref()?;
        let ms: f64 = rand::thread_rng().sample(distr);
        Some(Duration::from_secs_f64(ms.max(0.) / 1_000.))
    }

    /// Check `tx` against the ledger state and commit it.
    fn commit(&self, tx: Value) -> Result<(), (StatusCode, String)> {
        transaction::validate(&tx).map_err(invalid)?;

        let mut store = self.store();
        let id = tx["id"].as_str().unwrap_or_default().to_string();
        if store.transactions.contains_key(&id) {
            return Err(bad_request(format!(
                "Invalid transaction (DuplicateTransaction): transaction `{id}` already exists"
            )));
        }

        let mut spends = vec![];
        if tx["operation"].as_str() == Some("TRANSFER") {
            for input in tx["inputs"].as_array().into_iter().flatten() {
                let spent_id = input["fulfills"]["transaction_id"].as_str().unwrap_or_default();
                let index = input["fulfills"]["output_index"].as_u64().unwrap_or_default();

                let exists = store
                    .transactions
                    .get(spent_id)
                    .is_some_and(|prev| prev["outputs"].get(index as usize).is_some());
                if !exists {
                    return Err(bad_request(format!(
                        "Invalid transaction (InputDoesNotExist): input `{spent_id}` does not exist"
                    )));
                }

                let key = (spent_id.to_string(), index);
                if store.spent.contains(&key) || spends.contains(&key) {
                    return Err(bad_request(format!(
                        "Invalid transaction (DoubleSpend): input `{spent_id}` was already spent"
                    )));
                }
                spends.push(key);
            }
        }

        store.spent.extend(spends);
        store.transactions.insert(id, tx);
        Ok(())
    }
}

pub fn router(ledger: Arc<MockLedger>) -> Router {
    Router::new()
        .route("/api/v1/transactions", post(post_transaction))
        .route("/api/v1/transactions/:id", get(get_transaction))
        .route("/api/v1/assets", get(search_assets))
        .with_state(ledger)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr, ledger: Arc<MockLedger>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(ledger)).await
}

/// Serve a fresh mock on an ephemeral local port.
pub async fn spawn(behavior: Behavior) -> std::io::Result<(SocketAddr, Arc<MockLedger>)> {
    let ledger = Arc::new(MockLedger::new(behavior));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let app = router(ledger.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!("Mock ledger stopped: {err}");
        }
    });

    Ok((addr, ledger))
}

/// Base URL of the API served at `addr`.
pub fn api_url(addr: SocketAddr) -> String {
    format!("http://{addr}/api/v1/")
}

type Reply = (StatusCode, Json<Value>);

async fn post_transaction(
    State(ledger): State<Arc<MockLedger>>,
    Json(tx): Json<Value>,
) -> Reply {
    let post = ledger.posts.fetch_add(1, Ordering::Relaxed);
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);

    if let Some(delay) = ledger.latency() {
        tokio::time::sleep(delay).await;
    }

    if post < ledger.behavior.fail_first {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".into());
    }
    if ledger.behavior.reject_all {
        return error(
            StatusCode::BAD_REQUEST,
            "Invalid transaction (ValidationError): rejected by mock".into(),
        );
    }
    if let Some(limiter) = &ledger.limiter {
        if limiter.check().is_err() {
            return error(StatusCode::TOO_MANY_REQUESTS, "Too many requests".into());
        }
    }

    match ledger.commit(tx.clone()) {
        Ok(()) => {
            counter!("mock_ledger_committed").increment(1);
            debug!("Committed {}", tx["id"]);
            (StatusCode::ACCEPTED, Json(tx))
        }
        Err((status, message)) => {
            counter!("mock_ledger_refused").increment(1);
            debug!("Refused: {message}");
            error(status, message)
        }
    }
}

async fn get_transaction(State(ledger): State<Arc<MockLedger>>, Path(id): Path<String>) -> Reply {
    match ledger.transaction(&id) {
        Some(tx) => (StatusCode::OK, Json(tx)),
        None => error(StatusCode::NOT_FOUND, "Not found".into()),
    }
}

#[derive(Deserialize)]
struct SearchQuery {
    search: String,
}

async fn search_assets(
    State(ledger): State<Arc<MockLedger>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Value>> {
    let needle = query.search.to_lowercase();
    let store = ledger.store();
    let mut found: Vec<Value> = store
        .transactions
        .iter()
        .filter(|(_, tx)| tx["operation"].as_str() == Some("CREATE"))
        .filter(|(_, tx)| tx["asset"]["data"].to_string().to_lowercase().contains(&needle))
        .map(|(id, tx)| json!({ "id": id, "data": tx["asset"]["data"] }))
        .collect();
    found.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    Json(found)
}

fn error(status: StatusCode, message: String) -> Reply {
    (
        status,
        Json(json!({ "message": message, "status": status.as_u16() })),
    )
}

fn bad_request(message: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message)
}

fn invalid(err: InvalidTransaction) -> (StatusCode, String) {
    let kind = match err {
        InvalidTransaction::Malformed(_) => "SchemaValidationError",
        InvalidTransaction::IdMismatch => "InvalidHash",
        _ => "InvalidSignature",
    };
    bad_request(format!("Invalid transaction ({kind}): {err}"))
}

// Posts per second, printed by the binary.

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        println!("{transactions} TPS");
    }
}
