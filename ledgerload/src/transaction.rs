//! Ledger transactions
//!
//! Records are written as version 2.0 ledger transactions: JSON documents with a single
//! `ed25519-sha-256` output, signed per input over the canonical (key-sorted, compact)
//! serialization of the transaction. The transaction id is the SHA3-256 of the signed body
//! with `id` set to `null`.
use crate::error::{EncodingError, InvalidTransaction};
use crate::identity::Identity;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

const VERSION: &str = "2.0";
const CONDITION_TYPE: &str = "ed25519-sha-256";
const CONDITION_COST: u32 = 131_072;

// DER prefixes of the ed25519-sha-256 fingerprint and fulfillment.
const FINGERPRINT_PREFIX: [u8; 4] = [0x30, 0x22, 0x80, 0x20];
const FULFILLMENT_PREFIX: [u8; 4] = [0xa4, 0x64, 0x80, 0x20];
const SIGNATURE_TAG: [u8; 2] = [0x81, 0x40];
const FULFILLMENT_LEN: usize = 102;

/// A fully built and signed write request.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRecord {
    id: String,
    body: Value,
}

impl SignedRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    pub fn operation(&self) -> Option<&str> {
        self.body["operation"].as_str()
    }

    /// Asset data of a CREATE; `None` for transfers.
    pub fn asset_data(&self) -> Option<&Value> {
        self.body["asset"].get("data")
    }
}

/// Build a CREATE of `payload` owned and signed by `identity`.
pub fn build(payload: &Value, identity: &Identity) -> Result<SignedRecord, EncodingError> {
    build_create(payload, &Value::Null, identity)
}

pub fn build_create(
    asset_data: &Value,
    metadata: &Value,
    issuer: &Identity,
) -> Result<SignedRecord, EncodingError> {
    if !(asset_data.is_object() || asset_data.is_null()) {
        return Err(EncodingError::PayloadNotObject(kind(asset_data)));
    }
    check_metadata(metadata)?;

    let tx = json!({
        "id": null,
        "version": VERSION,
        "operation": "CREATE",
        "asset": { "data": asset_data },
        "metadata": metadata,
        "inputs": [{
            "owners_before": [issuer.public_key_base58()],
            "fulfills": null,
            "fulfillment": null,
        }],
        "outputs": [output(&issuer.public_key(), "1")],
    });

    sign(tx, issuer)
}

/// Build a TRANSFER of output `output_index` of `previous` to `recipient`.
///
/// `owner` must be the current owner of that output.
pub fn build_transfer(
    previous: &Value,
    output_index: u32,
    recipient: &VerifyingKey,
    owner: &Identity,
    metadata: &Value,
) -> Result<SignedRecord, EncodingError> {
    check_metadata(metadata)?;

    let previous_id = previous["id"]
        .as_str()
        .ok_or(EncodingError::Malformed("previous transaction has no id"))?;
    let spent = previous["outputs"]
        .get(output_index as usize)
        .ok_or(EncodingError::MissingOutput(output_index))?;
    let owners_before = spent["public_keys"]
        .as_array()
        .ok_or(EncodingError::Malformed("spent output has no public keys"))?;
    let amount = spent["amount"]
        .as_str()
        .ok_or(EncodingError::Malformed("spent output has no amount"))?;

    let owner_key = owner.public_key_base58();
    if !owners_before.iter().any(|key| key.as_str() == Some(owner_key.as_str())) {
        return Err(EncodingError::Malformed(
            "signing identity does not own the spent output",
        ));
    }

    let asset_id = match previous["operation"].as_str() {
        Some("CREATE") => previous_id,
        Some("TRANSFER") => previous["asset"]["id"]
            .as_str()
            .ok_or(EncodingError::Malformed("previous transfer has no asset id"))?,
        _ => return Err(EncodingError::Malformed("unknown operation")),
    };

    let tx = json!({
        "id": null,
        "version": VERSION,
        "operation": "TRANSFER",
        "asset": { "id": asset_id },
        "metadata": metadata,
        "inputs": [{
            "owners_before": owners_before,
            "fulfills": {
                "transaction_id": previous_id,
                "output_index": output_index,
            },
            "fulfillment": null,
        }],
        "outputs": [output(recipient, amount)],
    });

    sign(tx, owner)
}

/// Check that `tx` carries a matching id and a valid owner signature on every input.
pub fn validate(tx: &Value) -> Result<(), InvalidTransaction> {
    if !tx.is_object() {
        return Err(InvalidTransaction::Malformed("not a JSON object"));
    }
    let id = tx["id"]
        .as_str()
        .ok_or(InvalidTransaction::Malformed("missing id"))?;
    let inputs = tx["inputs"]
        .as_array()
        .filter(|inputs| !inputs.is_empty())
        .ok_or(InvalidTransaction::Malformed("missing inputs"))?;

    let mut unsigned = tx.clone();
    unsigned["id"] = Value::Null;
    let expected =
        transaction_id(&unsigned).map_err(|_| InvalidTransaction::Malformed("unserializable"))?;
    if expected != id {
        return Err(InvalidTransaction::IdMismatch);
    }

    if let Some(inputs) = unsigned["inputs"].as_array_mut() {
        for input in inputs.iter_mut().filter(|input| input.is_object()) {
            input["fulfillment"] = Value::Null;
        }
    }
    let message =
        canonical(&unsigned).map_err(|_| InvalidTransaction::Malformed("unserializable"))?;

    for (index, input) in inputs.iter().enumerate() {
        let (public_key, signature) = input["fulfillment"]
            .as_str()
            .and_then(parse_fulfillment)
            .ok_or(InvalidTransaction::BadFulfillment(index))?;

        let signer = bs58::encode(public_key.as_bytes()).into_string();
        let owned = input["owners_before"]
            .as_array()
            .is_some_and(|owners| owners.iter().any(|o| o.as_str() == Some(signer.as_str())));
        if !owned {
            return Err(InvalidTransaction::OwnerMismatch(index));
        }

        let digest = signing_digest(&message, &input["fulfills"]);
        public_key
            .verify(&digest, &signature)
            .map_err(|_| InvalidTransaction::BadSignature(index))?;
    }

    Ok(())
}

/// Key-sorted, whitespace-free JSON serialization (RFC 8785).
pub fn canonical(value: &Value) -> Result<String, serde_json::Error> {
    serde_jcs::to_string(value)
}

/// Crypto-condition URI locking an output to `public_key`.
pub fn condition_uri(public_key: &VerifyingKey) -> String {
    let mut fingerprint = Vec::with_capacity(FINGERPRINT_PREFIX.len() + PUBLIC_KEY_LENGTH);
    fingerprint.extend_from_slice(&FINGERPRINT_PREFIX);
    fingerprint.extend_from_slice(public_key.as_bytes());

    format!(
        "ni:///sha-256;{}?fpt={CONDITION_TYPE}&cost={CONDITION_COST}",
        URL_SAFE_NO_PAD.encode(Sha256::digest(&fingerprint))
    )
}

pub fn public_key_from_base58(encoded: &str) -> Result<VerifyingKey, EncodingError> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|err| EncodingError::PublicKey(err.to_string()))?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| EncodingError::PublicKey(format!("expected {PUBLIC_KEY_LENGTH} bytes")))?;
    VerifyingKey::from_bytes(&bytes).map_err(|err| EncodingError::PublicKey(err.to_string()))
}

fn output(public_key: &VerifyingKey, amount: &str) -> Value {
    let encoded = bs58::encode(public_key.as_bytes()).into_string();
    json!({
        "amount": amount,
        "condition": {
            "details": {
                "type": CONDITION_TYPE,
                "public_key": encoded,
            },
            "uri": condition_uri(public_key),
        },
        "public_keys": [encoded],
    })
}

fn sign(mut tx: Value, signer: &Identity) -> Result<SignedRecord, EncodingError> {
    let message = canonical(&tx)?;
    let public_key = signer.public_key();

    let inputs = tx["inputs"]
        .as_array_mut()
        .ok_or(EncodingError::Malformed("transaction has no inputs"))?;
    for input in inputs.iter_mut() {
        let digest = signing_digest(&message, &input["fulfills"]);
        let signature = signer.signing_key().sign(&digest);
        input["fulfillment"] = Value::String(fulfillment_uri(&public_key, &signature));
    }

    let id = transaction_id(&tx)?;
    tx["id"] = Value::String(id.clone());
    Ok(SignedRecord { id, body: tx })
}

fn transaction_id(tx: &Value) -> Result<String, serde_json::Error> {
    Ok(format!("{:x}", Sha3_256::digest(canonical(tx)?.as_bytes())))
}

fn signing_digest(message: &str, fulfills: &Value) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(message.as_bytes());
    if let (Some(tx_id), Some(index)) = (
        fulfills["transaction_id"].as_str(),
        fulfills["output_index"].as_u64(),
    ) {
        hasher.update(tx_id.as_bytes());
        hasher.update(index.to_string().as_bytes());
    }
    hasher.finalize().to_vec()
}

fn fulfillment_uri(public_key: &VerifyingKey, signature: &Signature) -> String {
    let mut der = Vec::with_capacity(FULFILLMENT_LEN);
    der.extend_from_slice(&FULFILLMENT_PREFIX);
    der.extend_from_slice(public_key.as_bytes());
    der.extend_from_slice(&SIGNATURE_TAG);
    der.extend_from_slice(&signature.to_bytes());
    URL_SAFE_NO_PAD.encode(der)
}

fn parse_fulfillment(uri: &str) -> Option<(VerifyingKey, Signature)> {
    let der = URL_SAFE_NO_PAD.decode(uri).ok()?;
    if der.len() != FULFILLMENT_LEN
        || der[..4] != FULFILLMENT_PREFIX
        || der[36..38] != SIGNATURE_TAG
    {
        return None;
    }

    let public_key = VerifyingKey::from_bytes(der[4..36].try_into().ok()?).ok()?;
    let signature = Signature::from_bytes(der[38..].try_into().ok()?);
    Some((public_key, signature))
}

fn check_metadata(metadata: &Value) -> Result<(), EncodingError> {
    if metadata.is_object() || metadata.is_null() {
        Ok(())
    } else {
        Err(EncodingError::MetadataNotObject(kind(metadata)))
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
