//! Credential exchange messages.
//!
//! Every body is a [`SignedPayload`]: `data` plus the sender's signature
//! over it. `my_did`/`their_did` are written from the sender's side.

use crate::error::{ProtocolError, Result};
use crate::payload::SignedPayload;
use medic_claims::{Claim, ClaimDefinition, ClaimOffer, ClaimRequest, Schema};
use medic_core::{Did, Message};
use serde::{Deserialize, Serialize};

pub const OFFER: &str = "credential/1.0/offer";
pub const REQUEST: &str = "credential/1.0/request";
pub const CLAIM: &str = "credential/1.0/claim";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferData {
    pub their_did: Did,
    pub my_did: Did,
    pub schema_type: String,
    pub nonce: u64,
    pub cred_def_id: String,
    pub definition: ClaimDefinition,
    pub offer: ClaimOffer,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    pub their_did: Did,
    pub my_did: Did,
    pub schema_type: String,
    pub nonce: u64,
    pub request: ClaimRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimData {
    pub their_did: Did,
    pub my_did: Did,
    pub schema_type: String,
    pub nonce: u64,
    pub claim: Claim,
}

#[derive(Debug, Clone)]
pub enum CredentialMessage {
    Offer(SignedPayload<OfferData>),
    Request(SignedPayload<RequestData>),
    Claim(SignedPayload<ClaimData>),
}

impl CredentialMessage {
    pub fn from_message(message: &Message) -> Result<Self> {
        match message.type_.as_str() {
            OFFER => Ok(Self::Offer(message.body_as()?)),
            REQUEST => Ok(Self::Request(message.body_as()?)),
            CLAIM => Ok(Self::Claim(message.body_as()?)),
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }

    pub fn type_(&self) -> &'static str {
        match self {
            Self::Offer(_) => OFFER,
            Self::Request(_) => REQUEST,
            Self::Claim(_) => CLAIM,
        }
    }
}
