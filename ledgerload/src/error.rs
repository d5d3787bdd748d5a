use std::path::PathBuf;
use thiserror::Error;

/// Failure to derive a signing identity. Fatal to the item that asked for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Mnemonic generation failed: {0}")]
    Mnemonic(String),

    #[error("Derivation task did not complete: {0}")]
    Task(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

impl From<bip39::Error> for DerivationError {
    fn from(err: bip39::Error) -> Self {
        Self::Mnemonic(err.to_string())
    }
}

/// The payload or key material cannot be expressed as a ledger transaction.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Asset data must be a JSON object or null, found {0}")]
    PayloadNotObject(&'static str),

    #[error("Metadata must be a JSON object or null, found {0}")]
    MetadataNotObject(&'static str),

    #[error("Transaction has no output at index {0}")]
    MissingOutput(u32),

    #[error("Malformed transaction: {0}")]
    Malformed(&'static str),

    #[error("Invalid public key: {0}")]
    PublicKey(String),

    #[error("Error serializing transaction: {0}")]
    Json(#[from] serde_json::Error),
}

/// Submission-level failures. These are the only errors the submitter retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Ledger rejected the transaction (HTTP {status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Ledger reported a conflict: {0}")]
    Conflict(String),
}

impl SubmitError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SubmitError::Conflict(_))
    }
}

impl From<reqwest::Error> for SubmitError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Why a work item ended up failed.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Identity derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Record encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Submission failed after {attempts} attempt(s): {source}")]
    Submit {
        attempts: u32,
        #[source]
        source: SubmitError,
    },

    #[error("Item task aborted: {0}")]
    Aborted(String),
}

impl ItemError {
    /// Submission attempts made before the item failed.
    pub fn attempts(&self) -> u32 {
        match self {
            ItemError::Submit { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// Errors from the ledger's read endpoints.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Request(#[from] SubmitError),

    #[error("Unexpected ledger response: {0}")]
    Decode(String),

    #[error("Invalid ledger URL: {0}")]
    Url(String),
}

/// A transaction failed validation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidTransaction {
    #[error("Malformed transaction: {0}")]
    Malformed(&'static str),

    #[error("Transaction id does not match its body")]
    IdMismatch,

    #[error("Input {0} has an undecodable fulfillment")]
    BadFulfillment(usize),

    #[error("Input {0} is not signed by its owner")]
    OwnerMismatch(usize),

    #[error("Input {0} has an invalid signature")]
    BadSignature(usize),
}

/// The run summary could not be written. Never affects the run itself.
#[derive(Error, Debug)]
#[error("Error writing report to {path}: {source}")]
pub struct ReportError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
