//! Ledger node access
//!
//! [`Ledger`] is the write endpoint the pipeline submits through; [`HttpLedger`] implements it
//! over the node's HTTP API and additionally exposes the read endpoints.
use crate::error::{LedgerError, SubmitError};
use crate::transaction::SignedRecord;
use ledgerload_core::LedgerConfig;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// The ledger's write endpoint.
#[trait_variant::make(Ledger: Send)]
pub trait LocalLedger {
    /// Submit `record` and resolve once the ledger has committed it.
    async fn post_commit(&self, record: &SignedRecord) -> Result<(), SubmitError>;
}

/// HTTP client for a ledger node.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone, Debug)]
pub struct HttpLedger {
    client: Client,
    base: Url,
}

impl HttpLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let mut url = config.url.trim().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        let base = Url::parse(&url).map_err(|err| LedgerError::Url(format!("{url}: {err}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(SubmitError::from)?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Fetch a committed transaction by id.
    #[instrument(skip(self))]
    pub async fn get_transaction(&self, id: &str) -> Result<Value, LedgerError> {
        let url = self.endpoint(&format!("transactions/{id}"))?;
        let res = self.client.get(url).send().await.map_err(SubmitError::from)?;
        match res.status() {
            StatusCode::NOT_FOUND => Err(LedgerError::NotFound(id.to_string())),
            status if status.is_success() => Ok(res.json().await.map_err(decode_error)?),
            status => Err(classify(status, &res.text().await.unwrap_or_default()).into()),
        }
    }

    /// Full-text search over asset data.
    #[instrument(skip(self))]
    pub async fn search_assets(&self, text: &str) -> Result<Vec<Value>, LedgerError> {
        let url = self.endpoint("assets")?;
        let res = self
            .client
            .get(url)
            .query(&[("search", text)])
            .send()
            .await
            .map_err(SubmitError::from)?;
        let status = res.status();
        if status.is_success() {
            Ok(res.json().await.map_err(decode_error)?)
        } else {
            Err(classify(status, &res.text().await.unwrap_or_default()).into())
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, LedgerError> {
        self.base
            .join(path)
            .map_err(|err| LedgerError::Url(err.to_string()))
    }
}

impl Ledger for HttpLedger {
    async fn post_commit(&self, record: &SignedRecord) -> Result<(), SubmitError> {
        let url = self
            .endpoint("transactions")
            .map_err(|err| SubmitError::Network(err.to_string()))?;

        let res = self
            .client
            .post(url)
            .query(&[("mode", "commit")])
            .json(record.body())
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            trace!("Committed {}", record.id());
            Ok(())
        } else {
            Err(classify(status, &res.text().await.unwrap_or_default()))
        }
    }
}

/// Map a non-success response onto the submission error taxonomy.
pub(crate) fn classify(status: StatusCode, body: &str) -> SubmitError {
    let reason = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        SubmitError::Network(format!("HTTP {}: {reason}", status.as_u16()))
    } else if status == StatusCode::CONFLICT || is_conflict(&reason) {
        SubmitError::Conflict(reason)
    } else {
        SubmitError::Rejected {
            status: status.as_u16(),
            reason,
        }
    }
}

fn is_conflict(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    ["doublespend", "double spend", "already spent", "duplicatetransaction"]
        .iter()
        .any(|marker| reason.contains(marker))
}

fn decode_error(err: reqwest::Error) -> LedgerError {
    LedgerError::Decode(err.to_string())
}
