//! # medic-claims
//!
//! Verifiable claims for medic agents.
//!
//! The protocol layer talks to two collaborators defined here:
//! - [`ClaimEngine`]: offers, requests, issuance, storage and proofs
//! - [`Ledger`]: public identifiers, schemas and claim definitions
//!
//! [`MemoryEngine`] and [`MemoryLedger`] are in-process implementations.

pub mod encoding;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod proof;
pub mod types;

pub use encoding::{attribute_values, AttributeValue, AttributeValues};
pub use engine::{ClaimEngine, MemoryEngine};
pub use error::{ClaimError, Result};
pub use ledger::{Ledger, LedgerError, MemoryLedger, NymRecord};
pub use proof::{
    AttributeInfo, CandidateClaims, Proof, ProofRequest, RequestedAttribute, RequestedClaims,
    Restriction,
};
pub use types::{
    Claim, ClaimDefinition, ClaimInfo, ClaimOffer, ClaimRequest, ClaimRequestMetadata, Schema,
};
