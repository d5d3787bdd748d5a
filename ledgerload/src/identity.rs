//! Signing identities
//!
//! Every identity comes from a freshly generated BIP-39 mnemonic: the mnemonic is stretched
//! into a 64 byte seed and the first 32 bytes become the Ed25519 secret key.
use crate::error::DerivationError;
use bip39::Mnemonic;
use ed25519_dalek::{SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use ledgerload_core::IdentityMode;
use std::fmt;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const MNEMONIC_WORDS: usize = 12;

/// An Ed25519 keypair controlling ledger records.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Derive a new identity from a fresh mnemonic.
    ///
    /// CPU-bound (the mnemonic is stretched with 2048 rounds of PBKDF2); prefer [`derive`] from
    /// async code.
    pub fn generate() -> Result<Self, DerivationError> {
        let mnemonic = Mnemonic::generate(MNEMONIC_WORDS)?;
        let seed = mnemonic.to_seed("");
        let secret: [u8; SECRET_KEY_LENGTH] = seed[..SECRET_KEY_LENGTH]
            .try_into()
            .map_err(|_| DerivationError::InvalidKey("seed is shorter than a secret key".into()))?;
        Ok(Self::from_secret(&secret))
    }

    pub fn from_secret(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Parse a base58 encoded 32 byte private key.
    pub fn from_private_key_base58(encoded: &str) -> Result<Self, DerivationError> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|err| DerivationError::InvalidKey(err.to_string()))?;
        let secret: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            DerivationError::InvalidKey(format!(
                "expected {SECRET_KEY_LENGTH} bytes, found {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_secret(&secret))
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.public_key().as_bytes()).into_string()
    }

    pub fn private_key_base58(&self) -> String {
        bs58::encode(self.signing_key.as_bytes()).into_string()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key_base58())
            .finish_non_exhaustive()
    }
}

/// Derive an identity on the blocking pool.
pub async fn derive() -> Result<Identity, DerivationError> {
    tokio::task::spawn_blocking(Identity::generate)
        .await
        .map_err(|err| DerivationError::Task(err.to_string()))?
}

/// Hands out identities to work items according to an [`IdentityMode`].
#[derive(Clone, Debug)]
pub enum IdentitySource {
    PerItem,
    /// The outcome of the single derivation made for the run.
    Shared(Result<Arc<Identity>, DerivationError>),
}

impl IdentitySource {
    pub async fn new(mode: IdentityMode) -> Self {
        match mode {
            IdentityMode::PerItem => IdentitySource::PerItem,
            IdentityMode::Shared => {
                let shared = derive().await.map(Arc::new);
                match &shared {
                    Ok(identity) => info!("Using shared identity {}", identity.public_key_base58()),
                    Err(err) => error!("Shared identity derivation failed: {err}"),
                }
                IdentitySource::Shared(shared)
            }
        }
    }

    pub async fn identity(&self) -> Result<Arc<Identity>, DerivationError> {
        match self {
            IdentitySource::PerItem => derive().await.map(Arc::new),
            IdentitySource::Shared(shared) => shared.clone(),
        }
    }
}
