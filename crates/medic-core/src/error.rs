//! Error types for medic-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid DID format: {0}")]
    InvalidDid(String),

    #[error("Invalid verification key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid base58 encoding: {0}")]
    Base58(String),

    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Message could not be encoded: {0}")]
    Encoding(String),

    #[error("No recipient key supplied")]
    RecipientKey,

    #[error("Malformed or undecryptable envelope: {0}")]
    Decoding(String),

    #[error("Envelope is not addressed to any local key")]
    NotAddressed,

    #[error("Wallet is not open")]
    NotInitialized,

    #[error("Unknown local key: {0}")]
    UnknownKey(String),

    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
