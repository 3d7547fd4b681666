//! Proof requests, proofs and their verification.

use crate::types::{ClaimDefinition, Schema};
use crate::{encoding, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use medic_core::{keys, signing, Did, VerKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Accepted-issuer restriction on a requested attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_did: Option<Did>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_def_id: Option<String>,
}

impl Restriction {
    pub fn issuer(did: &Did) -> Self {
        Self {
            issuer_did: Some(did.clone()),
            cred_def_id: None,
        }
    }

    pub fn allows(&self, issuer_did: &Did, cred_def_id: &str) -> bool {
        self.issuer_did.as_ref().map_or(true, |d| d == issuer_did)
            && self.cred_def_id.as_deref().map_or(true, |c| c == cred_def_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
}

impl AttributeInfo {
    /// Empty restrictions accept any issuer; otherwise one must match.
    pub fn allows(&self, issuer_did: &Did, cred_def_id: &str) -> bool {
        self.restrictions.is_empty()
            || self
                .restrictions
                .iter()
                .any(|r| r.allows(issuer_did, cred_def_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub name: String,
    pub version: String,
    pub nonce: String,
    /// Referent to requested attribute.
    pub requested_attributes: BTreeMap<String, AttributeInfo>,
}

impl ProofRequest {
    pub fn new(name: &str, version: &str, nonce: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            nonce: nonce.to_string(),
            requested_attributes: BTreeMap::new(),
        }
    }

    /// Request `names` as `attr1_referent`, `attr2_referent`, ... restricted to `issuers`.
    pub fn with_attributes<I, S>(mut self, names: I, issuers: &[Did]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let restrictions: Vec<Restriction> = issuers.iter().map(Restriction::issuer).collect();
        let start = self.requested_attributes.len();
        for (i, name) in names.into_iter().enumerate() {
            self.requested_attributes.insert(
                format!("attr{}_referent", start + i + 1),
                AttributeInfo {
                    name: name.into(),
                    restrictions: restrictions.clone(),
                },
            );
        }
        self
    }
}

/// Claims matching each referent, in engine order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateClaims {
    pub attrs: BTreeMap<String, Vec<crate::ClaimInfo>>,
}

impl CandidateClaims {
    /// First candidate for every referent, or the first referent with none.
    pub fn select_first(&self, request: &ProofRequest) -> std::result::Result<RequestedClaims, String> {
        let mut selected = RequestedClaims::default();
        for referent in request.requested_attributes.keys() {
            let first = self
                .attrs
                .get(referent)
                .and_then(|c| c.first())
                .ok_or_else(|| referent.clone())?;
            selected.requested_attributes.insert(
                referent.clone(),
                RequestedAttribute {
                    cred_id: first.referent.clone(),
                    revealed: true,
                },
            );
        }
        Ok(selected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAttribute {
    pub cred_id: String,
    pub revealed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedClaims {
    pub requested_attributes: BTreeMap<String, RequestedAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedAttribute {
    pub sub_proof_index: usize,
    pub raw: String,
    pub encoded: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedProof {
    pub revealed_attrs: BTreeMap<String, RevealedAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub schema_id: String,
    pub cred_def_id: String,
}

/// Disclosure from one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProof {
    pub link_key: VerKey,
    /// Attribute name to (encoded value, issuer signature).
    pub attributes: BTreeMap<String, DisclosedAttribute>,
    /// Link-key signature binding this disclosure to the request nonce.
    pub nonce_signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedAttribute {
    pub encoded: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub requested_proof: RequestedProof,
    pub identifiers: Vec<Identifier>,
    pub proof: Vec<SubProof>,
}

/// Bytes the issuer signs for one attribute of a claim.
pub(crate) fn attribute_message(
    cred_def_id: &str,
    link_key: &VerKey,
    name: &str,
    encoded: &str,
) -> Result<Vec<u8>> {
    Ok(signing::canonicalize(&json!({
        "cred_def_id": cred_def_id,
        "link_key": link_key,
        "name": name,
        "encoded": encoded,
    }))?)
}

/// Bytes the holder signs to bind a disclosure to a request.
pub(crate) fn nonce_message(nonce: &str, cred_def_id: &str) -> Result<Vec<u8>> {
    Ok(signing::canonicalize(&json!({
        "nonce": nonce,
        "cred_def_id": cred_def_id,
    }))?)
}

fn signature_holds(key: &VerKey, message: &[u8], signature: &str) -> bool {
    STANDARD
        .decode(signature)
        .map(|sig| keys::verify(key, message, &sig).is_ok())
        .unwrap_or(false)
}

/// Check `proof` against the request it was built for.
///
/// Every requested referent must be revealed from a claim whose definition
/// and schema are in the supplied maps, whose issuer satisfies the
/// restrictions, and whose issuer and link-key signatures hold.
pub fn verify(
    request: &ProofRequest,
    proof: &Proof,
    schemas: &BTreeMap<String, Schema>,
    definitions: &BTreeMap<String, ClaimDefinition>,
) -> Result<bool> {
    for (referent, info) in &request.requested_attributes {
        let Some(revealed) = proof.requested_proof.revealed_attrs.get(referent) else {
            debug!(referent = %referent, "referent not revealed");
            return Ok(false);
        };
        let (Some(identifier), Some(sub)) = (
            proof.identifiers.get(revealed.sub_proof_index),
            proof.proof.get(revealed.sub_proof_index),
        ) else {
            return Ok(false);
        };
        let (Some(definition), Some(schema)) = (
            definitions.get(&identifier.cred_def_id),
            schemas.get(&identifier.schema_id),
        ) else {
            debug!(cred_def_id = %identifier.cred_def_id, "definition or schema not supplied");
            return Ok(false);
        };

        let named_id =
            ClaimDefinition::make_id(&definition.issuer_did, &definition.schema_id, &definition.tag);
        if definition.id != named_id || definition.id != identifier.cred_def_id {
            debug!(cred_def_id = %definition.id, "definition id does not name its issuer");
            return Ok(false);
        }
        if definition.schema_id != schema.id || !schema.has_attribute(&info.name) {
            return Ok(false);
        }
        if !info.allows(&definition.issuer_did, &definition.id) {
            debug!(referent = %referent, issuer = %definition.issuer_did, "restriction not met");
            return Ok(false);
        }
        if revealed.raw.len() > encoding::MAX_RAW_LEN
            || encoding::encode(&revealed.raw) != revealed.encoded
        {
            return Ok(false);
        }

        let Some(disclosed) = sub.attributes.get(&info.name) else {
            return Ok(false);
        };
        if disclosed.encoded != revealed.encoded {
            return Ok(false);
        }

        let message = attribute_message(&definition.id, &sub.link_key, &info.name, &disclosed.encoded)?;
        if !signature_holds(&definition.public_key, &message, &disclosed.signature) {
            return Ok(false);
        }

        let binding = nonce_message(&request.nonce, &definition.id)?;
        if !signature_holds(&sub.link_key, &binding, &sub.nonce_signature) {
            return Ok(false);
        }
    }
    Ok(true)
}
