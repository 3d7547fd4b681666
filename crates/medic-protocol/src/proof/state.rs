//! Proof exchange records.

use medic_claims::ProofRequest;
use medic_core::Did;
use serde::Serialize;
use std::collections::HashMap;

/// Hops in one proof exchange: offer, request, proof.
pub const NONCES_PER_EXCHANGE: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofRole {
    Prover,
    Verifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    OfferSent,
    OfferReceived,
    RequestSent,
    ProofSent,
    Verified,
    /// The prover could not satisfy the request.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofExchange {
    pub their_did: Did,
    pub role: ProofRole,
    pub status: ProofStatus,
    /// Nonce of the last message sent or accepted.
    pub nonce: u64,
    /// The request this exchange is judged against.
    pub request: Option<ProofRequest>,
    pub verified: Option<bool>,
}

impl ProofExchange {
    pub fn new(their_did: Did, role: ProofRole, status: ProofStatus, nonce: u64) -> Self {
        Self {
            their_did,
            role,
            status,
            nonce,
            request: None,
            verified: None,
        }
    }
}

#[derive(Debug)]
pub struct ProofBook {
    next_nonce: u64,
    trust_anchors: Vec<Did>,
    /// One exchange per side we play with each counterpart.
    exchanges: HashMap<(ProofRole, Did), ProofExchange>,
}

impl ProofBook {
    pub fn new(nonce_start: u64) -> Self {
        Self {
            next_nonce: nonce_start,
            trust_anchors: Vec::new(),
            exchanges: HashMap::new(),
        }
    }

    /// Nonce for a new offer; reserves the following two for its replies.
    pub fn take_nonce(&mut self) -> u64 {
        let nonce = self.next_nonce;
        self.next_nonce = self.next_nonce.wrapping_add(NONCES_PER_EXCHANGE);
        nonce
    }

    pub fn set_trust_anchors(&mut self, anchors: Vec<Did>) {
        self.trust_anchors = anchors;
    }

    pub fn trust_anchors(&self) -> &[Did] {
        &self.trust_anchors
    }

    pub fn exchange(&self, role: ProofRole, their_did: &Did) -> Option<&ProofExchange> {
        self.exchanges.get(&(role, their_did.clone()))
    }

    pub fn exchange_mut(&mut self, role: ProofRole, their_did: &Did) -> Option<&mut ProofExchange> {
        self.exchanges.get_mut(&(role, their_did.clone()))
    }

    /// Start `exchange`, replacing any earlier one in the same role.
    pub fn open(&mut self, exchange: ProofExchange) {
        self.exchanges
            .insert((exchange.role, exchange.their_did.clone()), exchange);
    }
}
