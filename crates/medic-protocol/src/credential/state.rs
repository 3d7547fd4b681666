//! Per-type credential exchange slots.

use medic_claims::{AttributeValues, ClaimDefinition, ClaimOffer, ClaimRequestMetadata, Schema};
use medic_core::Did;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRole {
    Issuer,
    Holder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    OfferSent,
    RequestSent,
    Issued,
    Stored,
}

/// One exchange of one schema type with one counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialExchange {
    pub schema_type: String,
    pub their_did: Did,
    pub role: CredentialRole,
    pub status: CredentialStatus,
    /// Nonce of the last message sent or accepted.
    pub nonce: u64,
    pub offer: ClaimOffer,
    pub definition: ClaimDefinition,
    pub schema: Schema,
    pub request_metadata: Option<ClaimRequestMetadata>,
    pub referent: Option<String>,
}

/// What an issuer hands out for one schema type.
#[derive(Debug, Clone)]
pub struct ClaimType {
    pub schema: Schema,
    pub definition: ClaimDefinition,
    pub values: AttributeValues,
}

#[derive(Debug, Default)]
pub struct CredentialBook {
    types: HashMap<String, ClaimType>,
    exchanges: HashMap<(String, Did), CredentialExchange>,
    obtained: BTreeSet<String>,
}

impl CredentialBook {
    pub fn register(
        &mut self,
        schema_type: &str,
        schema: Schema,
        definition: ClaimDefinition,
        values: AttributeValues,
    ) {
        self.types.insert(
            schema_type.to_string(),
            ClaimType {
                schema,
                definition,
                values,
            },
        );
    }

    pub fn has_registrations(&self) -> bool {
        !self.types.is_empty()
    }

    pub fn claim_type(&self, schema_type: &str) -> Option<&ClaimType> {
        self.types.get(schema_type)
    }

    pub fn exchange(&self, schema_type: &str, their_did: &Did) -> Option<&CredentialExchange> {
        self.exchanges
            .get(&(schema_type.to_string(), their_did.clone()))
    }

    pub fn exchange_mut(
        &mut self,
        schema_type: &str,
        their_did: &Did,
    ) -> Option<&mut CredentialExchange> {
        self.exchanges
            .get_mut(&(schema_type.to_string(), their_did.clone()))
    }

    /// Start (or restart) the exchange in its slot.
    pub fn open(&mut self, exchange: CredentialExchange) {
        self.exchanges.insert(
            (exchange.schema_type.clone(), exchange.their_did.clone()),
            exchange,
        );
    }

    pub fn mark_obtained(&mut self, schema_type: &str) {
        self.obtained.insert(schema_type.to_string());
    }

    pub fn obtained(&self, schema_type: &str) -> bool {
        self.obtained.contains(schema_type)
    }

    pub fn obtained_types(&self) -> Vec<String> {
        self.obtained.iter().cloned().collect()
    }
}
