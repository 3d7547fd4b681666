//! Error types for the claim engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Unknown claim definition: {0}")]
    UnknownDefinition(String),

    #[error("Unknown link secret: {0}")]
    UnknownLinkSecret(String),

    #[error("Unknown stored claim: {0}")]
    UnknownClaim(String),

    #[error("Offer does not match: {0}")]
    OfferMismatch(String),

    #[error("Invalid claim request: {0}")]
    InvalidRequest(String),

    #[error("Attribute values do not match the definition: {0}")]
    AttributeMismatch(String),

    #[error("Invalid issuer signature on attribute {0}")]
    InvalidSignature(String),

    #[error("No claim selected for referent {0}")]
    MissingAttribute(String),

    #[error("Core error: {0}")]
    Core(#[from] medic_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClaimError>;
