//! The Identity collaborator: identifier and key operations.
//!
//! Protocol code never touches key material. It asks an [`Identity`]
//! implementation to mint, sign, verify, encrypt and decrypt on its behalf.

use crate::{Did, Result, VerKey};
use async_trait::async_trait;
use serde_json::Value;

/// Result of opening an authenticated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    /// Sender key, absent for anonymous envelopes.
    pub sender_verkey: Option<VerKey>,
    /// The local key the envelope was opened with.
    pub recipient_verkey: VerKey,
}

/// Identifier and key management backend.
///
/// Every method except [`Identity::verify`] needs an open wallet and fails
/// with [`crate::Error::NotInitialized`] otherwise.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Mint a fresh identifier with its own key.
    async fn create_local_identifier(&self) -> Result<(Did, VerKey)>;

    /// Mint a bare key with no identifier attached (used for invitations).
    async fn create_key(&self) -> Result<VerKey>;

    /// Key of an identifier minted by this wallet.
    async fn key_for_local_identifier(&self, did: &Did) -> Result<VerKey>;

    /// Sign `bytes` with a local key.
    async fn sign(&self, key: &VerKey, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Check a detached signature. Never fails on a bad signature, only reports it.
    async fn verify(&self, key: &VerKey, bytes: &[u8], signature: &[u8]) -> Result<bool>;

    /// Authenticated encryption of `plaintext` from `sender` to every recipient.
    async fn encrypt_for(
        &self,
        recipients: &[VerKey],
        sender: &VerKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Open an envelope addressed to any local key.
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Decrypted>;

    /// Identifier, local or counterpart, that a key belongs to.
    async fn resolve_identifier_for_key(&self, key: &VerKey) -> Result<Option<Did>>;

    /// Remember a counterpart's identifier and key.
    async fn store_counterpart(&self, did: &Did, key: &VerKey) -> Result<()>;

    async fn set_metadata(&self, did: &Did, metadata: Value) -> Result<()>;

    async fn get_metadata(&self, did: &Did) -> Result<Option<Value>>;
}
