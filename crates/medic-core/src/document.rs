//! DID Document exchanged during the connection handshake.
//!
//! The document names the per-relationship identifier and the key the
//! counterpart should encrypt to. It is carried inside a connection request
//! and, signed with the invitation key, inside the connection response.

use crate::{Did, Error, Result, VerKey};
use serde::{Deserialize, Serialize};

/// JSON-LD context for connection documents.
pub const DID_CONTEXT: &str = "https://w3id.org/did/v1";

/// Key type advertised for every public key.
pub const KEY_TYPE: &str = "Ed25519VerificationKey2018";

/// Service type for agent endpoints.
pub const SERVICE_TYPE: &str = "MedicAgent";

/// A public key entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// Full ID of this key (e.g., "did:medic:...#keys-1")
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: Did,
    pub public_key_base58: VerKey,
}

/// An agent service entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub recipient_keys: Vec<VerKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

/// A DID Document describing one side of a pairwise relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: Did,
    pub public_key: Vec<PublicKey>,
    #[serde(default)]
    pub service: Vec<Service>,
}

impl DidDocument {
    /// Create a document for a freshly minted identifier.
    pub fn new(did: &Did, verkey: &VerKey) -> Self {
        Self {
            context: DID_CONTEXT.to_string(),
            id: did.clone(),
            public_key: vec![PublicKey {
                id: format!("{did}#keys-1"),
                type_: KEY_TYPE.to_string(),
                controller: did.clone(),
                public_key_base58: *verkey,
            }],
            service: vec![Service {
                id: format!("{did};medic"),
                type_: SERVICE_TYPE.to_string(),
                recipient_keys: vec![*verkey],
                service_endpoint: None,
            }],
        }
    }

    /// The verification key the document binds to its identifier.
    ///
    /// The key must be controlled by the document's identifier and the
    /// identifier must be derived from it.
    pub fn verkey(&self) -> Result<VerKey> {
        let key = self
            .public_key
            .iter()
            .find(|k| k.controller == self.id)
            .ok_or_else(|| Error::InvalidDid(format!("{} lists no key it controls", self.id)))?;

        if !self.id.matches(&key.public_key_base58) {
            return Err(Error::InvalidDid(format!(
                "{} is not derived from {}",
                self.id, key.public_key_base58
            )));
        }
        Ok(key.public_key_base58)
    }
}

/// The `connection` block of a handshake message: an identifier plus its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(rename = "DID")]
    pub did: Did,
    #[serde(rename = "DIDDoc")]
    pub did_doc: DidDocument,
}

impl ConnectionInfo {
    pub fn new(did: &Did, verkey: &VerKey) -> Self {
        Self {
            did: did.clone(),
            did_doc: DidDocument::new(did, verkey),
        }
    }

    /// Resolve the key, checking that the document describes `did`.
    pub fn verkey(&self) -> Result<VerKey> {
        if self.did_doc.id != self.did {
            return Err(Error::InvalidDid(format!(
                "document describes {}, expected {}",
                self.did_doc.id, self.did
            )));
        }
        self.did_doc.verkey()
    }
}
