//! Error types for the protocol engine.

use medic_claims::{ClaimError, LedgerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Message could not be encoded: {0}")]
    Encoding(String),

    #[error("No recipient key supplied")]
    RecipientKey,

    #[error("Malformed message: {0}")]
    Decoding(String),

    /// An envelope for some other party on a shared transport.
    #[error("Frame is not addressed to this agent")]
    NotAddressed,

    #[error("Unknown connection key: {0}")]
    UnknownConnectionKey(String),

    #[error("No exchange slot for schema type: {0}")]
    SchemaTypeMismatch(String),

    #[error("No trust anchor set")]
    MissingTrustAnchor,

    #[error("No stored claim satisfies {0}")]
    InsufficientClaims(String),

    #[error("Collaborator not initialized")]
    NotInitialized,

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Claim engine error: {0}")]
    ClaimEngine(#[from] ClaimError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("No pairwise connection with {0}")]
    UnknownPairwise(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Identity error: {0}")]
    Identity(medic_core::Error),

    #[error("Agent has stopped")]
    AgentStopped,
}

impl ProtocolError {
    /// Whether the agent itself can no longer make progress.
    ///
    /// Every other error aborts a single exchange or is returned to the caller.
    pub fn is_fatal_to_agent(&self) -> bool {
        matches!(self, Self::AgentStopped)
    }
}

impl From<medic_core::Error> for ProtocolError {
    fn from(err: medic_core::Error) -> Self {
        use medic_core::Error as Core;
        match err {
            Core::Encoding(msg) => Self::Encoding(msg),
            Core::RecipientKey => Self::RecipientKey,
            Core::Decoding(msg) => Self::Decoding(msg),
            Core::NotInitialized => Self::NotInitialized,
            Core::Transport(msg) => Self::Transport(msg),
            Core::NotAddressed => Self::NotAddressed,
            Core::InvalidSignature => Self::SignatureInvalid("signature does not verify".into()),
            Core::InvalidDid(msg) | Core::InvalidKey(msg) | Core::Base58(msg) => {
                Self::Decoding(msg)
            }
            Core::Base64(e) => Self::Decoding(e.to_string()),
            other => Self::Identity(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
