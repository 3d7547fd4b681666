//! # medic-core
//!
//! Identity and messaging primitives for medic agents.
//!
//! This crate provides:
//! - Ed25519 keys and per-relationship DIDs
//! - JCS canonicalization
//! - Connection DID documents
//! - The Identity collaborator trait and an in-memory wallet
//! - Authenticated envelopes and detachable signed fields
//! - The Transport collaborator trait and an in-process relay

pub mod authcrypt;
pub mod did;
pub mod document;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod keys;
pub mod message;
pub mod signed_field;
pub mod signing;
pub mod transport;
pub mod wallet;

pub use did::Did;
pub use document::{ConnectionInfo, DidDocument};
pub use envelope::EnvelopeCodec;
pub use error::Error;
pub use identity::{Decrypted, Identity};
pub use keys::{LocalKey, VerKey};
pub use message::{Message, MessageContext, Thread};
pub use signed_field::{sign_field, verify_field, SignedField, VerifiedField};
pub use transport::{MemoryRelay, MessageSink, RelayClient, Transport};
pub use wallet::MemoryWallet;

/// Result type for medic-core operations.
pub type Result<T> = std::result::Result<T, Error>;
