//! Single-record REST facade
//!
//! Thin pass-through to the ledger: one fresh identity and one submission per request, no
//! batching and no retries.
use crate::error::RuntimeError;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use ledgerload::error::{DerivationError, EncodingError, LedgerError, SubmitError};
use ledgerload::identity::{self, Identity};
use ledgerload::ledger::{HttpLedger, Ledger};
use ledgerload::transaction::{self, SignedRecord};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};

struct ServerState {
    ledger: HttpLedger,
    created: AtomicU64,
}

pub fn router(ledger: HttpLedger) -> Router {
    let state = ServerState {
        ledger,
        created: AtomicU64::new(0),
    };

    Router::new()
        .route("/create-asset", post(create_asset))
        .route("/transfer-asset", post(transfer_asset))
        .route("/asset", get(asset))
        .route("/assets", get(search_assets))
        .route("/transaction", get(transaction))
        .with_state(Arc::new(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn serve(port: u16, ledger: HttpLedger) -> Result<(), RuntimeError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| RuntimeError::Bind { addr, source })?;

    info!("Serving REST facade on {addr}");
    axum::serve(listener, router(ledger))
        .await
        .map_err(RuntimeError::Serve)
}

#[derive(Error, Debug)]
enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Identity derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Invalid transaction: {0}")]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for HandlerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => HandlerError::NotFound(format!("{id} not found")),
            LedgerError::Request(err) => HandlerError::Submit(err),
            err => HandlerError::Ledger(err),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        use HandlerError::*;
        let status = match &self {
            BadRequest(_) | Encoding(_) => StatusCode::BAD_REQUEST,
            NotFound(_) => StatusCode::NOT_FOUND,
            Submit(SubmitError::Conflict(_)) => StatusCode::CONFLICT,
            Submit(_) | Ledger(_) => StatusCode::BAD_GATEWAY,
            Derivation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "status": "error", "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreatedAsset {
    pub status: String,
    pub transaction_id: String,
    pub asset: Value,
    pub public_key: String,
    pub private_key: String,
}

#[instrument(skip_all)]
async fn create_asset(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<CreatedAsset>, HandlerError> {
    let asset = random_asset();
    let identity = identity::derive().await?;
    let record = transaction::build(&asset, &identity)?;

    submit(&state.ledger, &record).await?;
    let created = state.created.fetch_add(1, Ordering::Relaxed) + 1;
    info!("Asset created: {created}");

    Ok(Json(CreatedAsset {
        status: "created".to_string(),
        transaction_id: record.id().to_string(),
        asset,
        public_key: identity.public_key_base58(),
        private_key: identity.private_key_base58(),
    }))
}

#[derive(Deserialize, Debug)]
struct IdQuery {
    id: String,
}

#[instrument(skip(state))]
async fn asset(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Value>, HandlerError> {
    let tx = state.ledger.get_transaction(&query.id).await?;
    if tx["operation"].as_str() != Some("CREATE") {
        return Err(HandlerError::NotFound(format!("{} is not an asset", query.id)));
    }

    Ok(Json(json!({
        "id": query.id,
        "data": tx["asset"]["data"],
        "owner": tx["outputs"][0]["public_keys"][0],
    })))
}

#[instrument(skip(state))]
async fn transaction(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Value>, HandlerError> {
    Ok(Json(state.ledger.get_transaction(&query.id).await?))
}

#[derive(Deserialize, Debug)]
struct SearchQuery {
    search: String,
}

#[instrument(skip(state))]
async fn search_assets(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Value>>, HandlerError> {
    Ok(Json(state.ledger.search_assets(&query.search).await?))
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub transaction_id: String,
    pub recipient_public_key: String,
    pub sender_private_key: String,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub metadata: Value,
}

#[instrument(skip_all)]
async fn transfer_asset(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Value>, HandlerError> {
    let sender = Identity::from_private_key_base58(&req.sender_private_key)
        .map_err(|err| HandlerError::BadRequest(format!("sender_private_key: {err}")))?;
    let recipient = transaction::public_key_from_base58(&req.recipient_public_key)
        .map_err(|err| HandlerError::BadRequest(format!("recipient_public_key: {err}")))?;

    let previous = state.ledger.get_transaction(&req.transaction_id).await?;
    let record =
        transaction::build_transfer(&previous, req.output_index, &recipient, &sender, &req.metadata)?;

    submit(&state.ledger, &record).await?;
    info!("Transferred output {} of {}", req.output_index, req.transaction_id);

    Ok(Json(json!({
        "status": "transferred",
        "transaction_id": record.id(),
        "recipient": req.recipient_public_key,
    })))
}

async fn submit(ledger: &HttpLedger, record: &SignedRecord) -> Result<(), HandlerError> {
    Ledger::post_commit(ledger, record).await.map_err(|err| {
        warn!("Ledger refused {}: {err}", record.id());
        HandlerError::Submit(err)
    })
}

fn random_asset() -> Value {
    let mut rng = rand::thread_rng();
    json!({
        "price": rng.gen::<f64>() * 1000.,
        "user": format!("user-{}", rng.gen_range(0..1000)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ledgerload_core::LedgerConfig;
    use tower::ServiceExt;

    fn unreachable_ledger() -> HttpLedger {
        // Nothing listens on the discard port.
        HttpLedger::new(&LedgerConfig::new("http://127.0.0.1:9/api/v1/")).unwrap()
    }

    #[test]
    fn errors_map_to_statuses() {
        let status = |err: HandlerError| err.into_response().status();
        assert_eq!(status(HandlerError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(LedgerError::NotFound("abc".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(SubmitError::Conflict("DoubleSpend".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(SubmitError::Network("refused".into()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(
                SubmitError::Rejected {
                    status: 400,
                    reason: "bad".into()
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn random_assets_look_like_orders() {
        let asset = random_asset();
        let price = asset["price"].as_f64().unwrap();
        assert!((0. ..1000.).contains(&price));
        assert!(asset["user"].as_str().unwrap().starts_with("user-"));
    }

    #[tokio::test]
    async fn malformed_transfer_is_rejected_before_the_ledger() {
        let body = json!({
            "transaction_id": "abc",
            "recipient_public_key": "not-base58-0OIl",
            "sender_private_key": Identity::from_secret(&[1; 32]).private_key_base58(),
        });
        let res = router(unreachable_ledger())
            .oneshot(
                Request::post("/transfer-asset")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_ledger_is_a_bad_gateway() {
        let res = router(unreachable_ledger())
            .oneshot(Request::get("/transaction?id=abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
