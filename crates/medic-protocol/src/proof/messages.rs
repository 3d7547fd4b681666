//! Proof exchange messages.

use crate::error::{ProtocolError, Result};
use crate::payload::SignedPayload;
use medic_claims::{Proof, ProofRequest};
use medic_core::{Did, Message};
use serde::{Deserialize, Serialize};

pub const OFFER: &str = "proof/1.0/offer";
pub const REQUEST: &str = "proof/1.0/request";
pub const PROOF: &str = "proof/1.0/proof";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfferData {
    pub their_did: Did,
    pub my_did: Did,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequestData {
    pub their_did: Did,
    pub my_did: Did,
    pub nonce: u64,
    pub proof_request: ProofRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofData {
    pub their_did: Did,
    pub my_did: Did,
    pub nonce: u64,
    pub proof: Proof,
}

#[derive(Debug, Clone)]
pub enum ProofMessage {
    Offer(SignedPayload<ProofOfferData>),
    Request(SignedPayload<ProofRequestData>),
    Proof(SignedPayload<ProofData>),
}

impl ProofMessage {
    pub fn from_message(message: &Message) -> Result<Self> {
        match message.type_.as_str() {
            OFFER => Ok(Self::Offer(message.body_as()?)),
            REQUEST => Ok(Self::Request(message.body_as()?)),
            PROOF => Ok(Self::Proof(message.body_as()?)),
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }

    pub fn type_(&self) -> &'static str {
        match self {
            Self::Offer(_) => OFFER,
            Self::Request(_) => REQUEST,
            Self::Proof(_) => PROOF,
        }
    }
}
