mod utils;
#[allow(unused)]
use utils::*;

use ledgerload::identity::Identity;
use ledgerload::ledger::HttpLedger;
use ledgerload_core::LedgerConfig;
use ledgerload_runtime::server::{router, CreatedAsset};
use mock_ledger::Behavior;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::net::SocketAddr;

/// Serve the facade in front of a fresh mock ledger; returns the facade's base URL.
async fn facade(behavior: Behavior) -> String {
    let (url, _ledger) = mock(behavior).await;
    let ledger = HttpLedger::new(&LedgerConfig::new(&url)).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(ledger)).await.unwrap();
    });

    format!("http://{addr}")
}

async fn create(client: &Client, base: &str) -> CreatedAsset {
    let res = client
        .post(format!("{base}/create-asset"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn created_assets_can_be_fetched() {
    let base = facade(Behavior::default()).await;
    let client = Client::new();

    let created = create(&client, &base).await;
    assert_eq!(created.status, "created");
    assert!(created.asset["user"].as_str().unwrap().starts_with("user-"));

    let asset: Value = client
        .get(format!("{base}/asset"))
        .query(&[("id", &created.transaction_id)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(asset["data"], created.asset);
    assert_eq!(asset["owner"], json!(created.public_key));

    let tx: Value = client
        .get(format!("{base}/transaction"))
        .query(&[("id", &created.transaction_id)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tx["operation"], "CREATE");

    let user = created.asset["user"].as_str().unwrap();
    let found: Vec<Value> = client
        .get(format!("{base}/assets"))
        .query(&[("search", user)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(found.iter().any(|asset| asset["id"] == json!(created.transaction_id)));
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn transfers_move_ownership_once() {
    let base = facade(Behavior::default()).await;
    let client = Client::new();
    let created = create(&client, &base).await;
    let bob = Identity::from_secret(&[11; 32]);
    let carol = Identity::from_secret(&[12; 32]);

    let transfer = |recipient: &Identity| {
        client
            .post(format!("{base}/transfer-asset"))
            .json(&json!({
                "transaction_id": created.transaction_id,
                "recipient_public_key": recipient.public_key_base58(),
                "sender_private_key": created.private_key,
            }))
            .send()
    };

    let res = transfer(&bob).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "transferred");

    let tx: Value = client
        .get(format!("{base}/transaction"))
        .query(&[("id", body["transaction_id"].as_str().unwrap())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tx["operation"], "TRANSFER");
    assert_eq!(tx["asset"]["id"], json!(created.transaction_id));
    assert_eq!(tx["outputs"][0]["public_keys"][0], json!(bob.public_key_base58()));

    let res = transfer(&carol).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn bad_requests_are_reported() {
    let base = facade(Behavior::default()).await;
    let client = Client::new();

    let res = client
        .get(format!("{base}/asset"))
        .query(&[("id", "0000")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let created = create(&client, &base).await;
    let res = client
        .post(format!("{base}/transfer-asset"))
        .json(&json!({
            "transaction_id": created.transaction_id,
            "recipient_public_key": Identity::from_secret(&[13; 32]).public_key_base58(),
            "sender_private_key": Identity::from_secret(&[14; 32]).private_key_base58(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn refusing_ledger_is_a_bad_gateway() {
    let base = facade(Behavior {
        fail_first: 1,
        ..Behavior::default()
    })
    .await;
    let client = Client::new();

    let res = client
        .post(format!("{base}/create-asset"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    // No retries in the facade; the next request goes through.
    create(&client, &base).await;
}
