//! Decentralized Identifier (DID) handling.
//!
//! Format: `did:medic:<base58(first 16 bytes of the ed25519 verification key)>`
//!
//! A party mints one identifier per relationship, so the identifier alone
//! says nothing about which other relationships it takes part in.

use crate::keys::VerKey;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DID method name.
pub const DID_METHOD: &str = "medic";

/// Number of verification-key bytes an identifier is derived from.
pub const DID_ID_LEN: usize = 16;

/// A parsed medic DID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did {
    id: [u8; DID_ID_LEN],
}

impl Did {
    /// Derive the identifier for a verification key.
    pub fn from_verkey(verkey: &VerKey) -> Self {
        let mut id = [0u8; DID_ID_LEN];
        id.copy_from_slice(&verkey.as_bytes()[..DID_ID_LEN]);
        Self { id }
    }

    /// The method-specific identifier, base58 encoded.
    pub fn method_id(&self) -> String {
        bs58::encode(&self.id).into_string()
    }

    /// Whether this identifier was derived from `verkey`.
    pub fn matches(&self, verkey: &VerKey) -> bool {
        verkey.as_bytes()[..DID_ID_LEN] == self.id
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", DID_METHOD, self.method_id())
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidDid(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }
        if parts[0] != "did" {
            return Err(Error::InvalidDid("must start with 'did'".into()));
        }
        if parts[1] != DID_METHOD {
            return Err(Error::InvalidDid(format!("method must be '{DID_METHOD}'")));
        }

        let bytes = bs58::decode(parts[2])
            .into_vec()
            .map_err(|e| Error::Base58(e.to_string()))?;

        let id: [u8; DID_ID_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidDid(format!(
                "identifier must be {} bytes, got {}",
                DID_ID_LEN,
                b.len()
            ))
        })?;

        Ok(Self { id })
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::LocalKey;

    #[test]
    fn test_did_roundtrip() {
        let key = LocalKey::generate();
        let did = Did::from_verkey(&key.verkey());

        let did_str = did.to_string();
        assert!(did_str.starts_with("did:medic:"));

        let parsed: Did = did_str.parse().unwrap();
        assert_eq!(did, parsed);
        assert!(parsed.matches(&key.verkey()));
    }

    #[test]
    fn test_did_rejects_wrong_method() {
        let err = "did:sov:4QxzWk3ajdnEA37NdNU5Kt".parse::<Did>().unwrap_err();
        assert!(matches!(err, Error::InvalidDid(_)));
    }

    #[test]
    fn test_did_rejects_wrong_length() {
        let err = "did:medic:3yZe7d".parse::<Did>().unwrap_err();
        assert!(matches!(err, Error::InvalidDid(_)));
    }

    #[test]
    fn test_did_serde_as_string() {
        let did = Did::from_verkey(&LocalKey::generate().verkey());
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, format!("\"{}\"", did));

        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
        assert!(serde_json::from_str::<Did>("\"did:medic:!!\"").is_err());
    }
}
