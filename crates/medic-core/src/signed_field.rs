//! Detachable signed sub-objects.
//!
//! A signed field proves who authored one part of a message independently
//! of how the rest of the message travels. The signed bytes are an 8-byte
//! big-endian Unix timestamp followed by the canonical JSON of the value.

use crate::identity::Identity;
use crate::{signing, Error, Result, VerKey};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SIGNATURE_TYPE: &str = "SIGNATURE";

const TIMESTAMP_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedField {
    #[serde(rename = "@type")]
    pub type_: String,
    pub signer: VerKey,
    /// Base64url of `timestamp || payload`.
    pub sig_data: String,
    /// Base64url of the signature over the decoded `sig_data`.
    pub signature: String,
}

/// A decoded signed field.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedField {
    pub value: Value,
    pub timestamp: u64,
    pub verified: bool,
}

impl VerifiedField {
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.value).map_err(|e| Error::Decoding(e.to_string()))
    }
}

/// Sign `value` with `signer`, a key held by `identity`.
pub async fn sign_field<T: Serialize>(
    identity: &dyn Identity,
    value: &T,
    signer: &VerKey,
) -> Result<SignedField> {
    let timestamp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    let payload = signing::canonicalize(value).map_err(|e| Error::Encoding(e.to_string()))?;

    let mut data = Vec::with_capacity(TIMESTAMP_LEN + payload.len());
    data.extend_from_slice(&timestamp.to_be_bytes());
    data.extend_from_slice(&payload);

    let signature = identity.sign(signer, &data).await?;

    Ok(SignedField {
        type_: SIGNATURE_TYPE.to_string(),
        signer: *signer,
        sig_data: URL_SAFE.encode(&data),
        signature: URL_SAFE.encode(signature),
    })
}

/// Decode a signed field and check its signature.
///
/// The embedded value is returned whether or not the signature holds; the
/// caller decides what a failed check means. Only an undecodable `sig_data`
/// is an error.
pub async fn verify_field(identity: &dyn Identity, field: &SignedField) -> Result<VerifiedField> {
    let data = URL_SAFE
        .decode(&field.sig_data)
        .map_err(|e| Error::Decoding(format!("sig_data: {e}")))?;
    if data.len() < TIMESTAMP_LEN {
        return Err(Error::Decoding("sig_data shorter than timestamp".into()));
    }

    let (ts, payload) = data.split_at(TIMESTAMP_LEN);
    let mut ts_bytes = [0u8; TIMESTAMP_LEN];
    ts_bytes.copy_from_slice(ts);
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| Error::Decoding(format!("sig_data: {e}")))?;

    let verified = match URL_SAFE.decode(&field.signature) {
        Ok(signature) => {
            field.type_ == SIGNATURE_TYPE
                && identity.verify(&field.signer, &data, &signature).await?
        }
        Err(_) => false,
    };

    Ok(VerifiedField {
        value,
        timestamp: u64::from_be_bytes(ts_bytes),
        verified,
    })
}
