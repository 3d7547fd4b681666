//! Key management for medic agents.
//!
//! Every key is an Ed25519 key. The same key material is used for
//! authenticated encryption after conversion to X25519.

use crate::{Did, Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A public verification key, base58 encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerKey([u8; 32]);

impl VerKey {
    /// Wrap raw key bytes, rejecting points that are not valid Ed25519 keys.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self(*bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The Ed25519 verifying key.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| Error::InvalidKey(e.to_string()))
    }

    /// The X25519 public key for this verification key.
    pub fn x25519(&self) -> Result<x25519_dalek::PublicKey> {
        let montgomery = self.verifying_key()?.to_montgomery();
        Ok(x25519_dalek::PublicKey::from(montgomery.to_bytes()))
    }

    /// Identifier derived from this key.
    pub fn did(&self) -> Did {
        Did::from_verkey(self)
    }
}

impl fmt::Display for VerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for VerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerKey({self})")
    }
}

impl FromStr for VerKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| Error::Base58(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| Error::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Self::from_bytes(&bytes)
    }
}

impl TryFrom<String> for VerKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<VerKey> for String {
    fn from(key: VerKey) -> Self {
        key.to_string()
    }
}

impl From<VerifyingKey> for VerKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

/// A locally held signing key.
///
/// Only the wallet holds these; protocol code refers to keys by [`VerKey`].
pub struct LocalKey {
    signing_key: SigningKey,
}

impl LocalKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from existing secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn verkey(&self) -> VerKey {
        self.signing_key.verifying_key().into()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// The X25519 static secret for this key.
    pub fn x25519(&self) -> x25519_dalek::StaticSecret {
        x25519_dalek::StaticSecret::from(self.signing_key.to_scalar_bytes())
    }

    /// Get the secret key bytes (be careful with this!).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKey")
            .field("verkey", &self.verkey())
            .finish_non_exhaustive()
    }
}

/// Verify a detached signature against a verification key.
pub fn verify(verkey: &VerKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| Error::InvalidSignature)?;
    verkey
        .verifying_key()?
        .verify(message, &Signature::from_bytes(&bytes))
        .map_err(|_| Error::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = LocalKey::generate();
        let message = b"hello world";
        let signature = key.sign(message);

        verify(&key.verkey(), message, &signature.to_bytes()).unwrap();
        assert!(verify(&key.verkey(), b"other", &signature.to_bytes()).is_err());
    }

    #[test]
    fn test_verkey_base58_roundtrip() {
        let verkey = LocalKey::generate().verkey();
        let parsed: VerKey = verkey.to_string().parse().unwrap();
        assert_eq!(parsed, verkey);
    }

    #[test]
    fn test_verkey_rejects_short_input() {
        assert!("3yZe7d".parse::<VerKey>().is_err());
        assert!("not-base58-0OIl".parse::<VerKey>().is_err());
    }

    #[test]
    fn test_x25519_agreement_matches() {
        let alice = LocalKey::generate();
        let bob = LocalKey::generate();

        let ab = alice.x25519().diffie_hellman(&bob.verkey().x25519().unwrap());
        let ba = bob.x25519().diffie_hellman(&alice.verkey().x25519().unwrap());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn test_from_bytes_is_stable() {
        let key = LocalKey::generate();
        let restored = LocalKey::from_bytes(&key.to_bytes());
        assert_eq!(restored.verkey(), key.verkey());
    }
}
