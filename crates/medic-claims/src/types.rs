//! Schemas, claim definitions and the issuance messages.

use crate::encoding::AttributeValue;
use medic_core::{Did, VerKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A claim-type schema: a named, versioned list of attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub id: String,
    pub name: String,
    pub version: String,
    pub attr_names: Vec<String>,
    pub issuer_did: Did,
}

impl Schema {
    pub fn new<I, S>(issuer_did: &Did, name: &str, version: &str, attr_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: format!("{issuer_did}:2:{name}:{version}"),
            name: name.to_string(),
            version: version.to_string(),
            attr_names: attr_names.into_iter().map(Into::into).collect(),
            issuer_did: issuer_did.clone(),
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attr_names.iter().any(|a| a == name)
    }
}

/// Public half of an issuer's claim definition for one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDefinition {
    pub id: String,
    pub schema_id: String,
    pub issuer_did: Did,
    pub tag: String,
    pub attr_names: Vec<String>,
    /// Key the issuer signs attributes with.
    pub public_key: VerKey,
}

impl ClaimDefinition {
    pub fn make_id(issuer_did: &Did, schema_id: &str, tag: &str) -> String {
        format!("{issuer_did}:3:CL:{schema_id}:{tag}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOffer {
    pub schema_id: String,
    pub cred_def_id: String,
    pub nonce: String,
}

/// A holder's request, bound to its link secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub prover_did: Did,
    pub cred_def_id: String,
    pub offer_nonce: String,
    /// Public half of the holder's link secret.
    pub link_key: VerKey,
    /// Link-key signature over the request binding.
    pub binding: String,
    pub nonce: String,
}

/// Holder-side record needed to store the issued claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequestMetadata {
    pub link_secret_name: String,
    pub cred_def_id: String,
    pub nonce: String,
}

/// One issued attribute with the issuer's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttribute {
    pub raw: String,
    pub encoded: String,
    pub signature: String,
}

impl SignedAttribute {
    pub fn value(&self) -> AttributeValue {
        AttributeValue {
            raw: self.raw.clone(),
            encoded: self.encoded.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub schema_id: String,
    pub cred_def_id: String,
    pub link_key: VerKey,
    pub values: BTreeMap<String, SignedAttribute>,
}

/// What a holder can see about one stored claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimInfo {
    pub referent: String,
    pub schema_id: String,
    pub cred_def_id: String,
    pub issuer_did: Did,
    pub attrs: BTreeMap<String, String>,
}
