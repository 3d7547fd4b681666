//! In-memory wallet implementing the [`Identity`] collaborator.

use crate::identity::{Decrypted, Identity};
use crate::{authcrypt, keys, Did, Error, LocalKey, Result, VerKey};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
struct WalletData {
    keys: HashMap<VerKey, LocalKey>,
    my_dids: HashMap<Did, VerKey>,
    their_dids: HashMap<Did, VerKey>,
    metadata: HashMap<Did, Value>,
}

struct Inner {
    open: bool,
    data: WalletData,
}

/// A wallet that keeps keys and records in process memory.
///
/// The wallet starts closed. Contents survive `close`/`open` cycles.
pub struct MemoryWallet {
    name: String,
    inner: RwLock<Inner>,
}

impl MemoryWallet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner {
                open: false,
                data: WalletData::default(),
            }),
        }
    }

    /// Create and open a wallet in one step.
    pub fn opened(name: impl Into<String>) -> Self {
        let wallet = Self::new(name);
        wallet.open();
        wallet
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn open(&self) {
        self.inner.write().open = true;
        debug!(wallet = %self.name, "wallet opened");
    }

    pub fn close(&self) {
        self.inner.write().open = false;
        debug!(wallet = %self.name, "wallet closed");
    }

    pub fn is_open(&self) -> bool {
        self.inner.read().open
    }

    fn read<T>(&self, f: impl FnOnce(&WalletData) -> Result<T>) -> Result<T> {
        let inner = self.inner.read();
        if !inner.open {
            return Err(Error::NotInitialized);
        }
        f(&inner.data)
    }

    fn write<T>(&self, f: impl FnOnce(&mut WalletData) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.write();
        if !inner.open {
            return Err(Error::NotInitialized);
        }
        f(&mut inner.data)
    }
}

#[async_trait]
impl Identity for MemoryWallet {
    async fn create_local_identifier(&self) -> Result<(Did, VerKey)> {
        self.write(|data| {
            let key = LocalKey::generate();
            let verkey = key.verkey();
            let did = verkey.did();
            data.keys.insert(verkey, key);
            data.my_dids.insert(did.clone(), verkey);
            Ok((did, verkey))
        })
    }

    async fn create_key(&self) -> Result<VerKey> {
        self.write(|data| {
            let key = LocalKey::generate();
            let verkey = key.verkey();
            data.keys.insert(verkey, key);
            Ok(verkey)
        })
    }

    async fn key_for_local_identifier(&self, did: &Did) -> Result<VerKey> {
        self.read(|data| {
            data.my_dids
                .get(did)
                .copied()
                .ok_or_else(|| Error::UnknownIdentifier(did.to_string()))
        })
    }

    async fn sign(&self, key: &VerKey, bytes: &[u8]) -> Result<Vec<u8>> {
        self.read(|data| {
            let local = data
                .keys
                .get(key)
                .ok_or_else(|| Error::UnknownKey(key.to_string()))?;
            Ok(local.sign(bytes).to_bytes().to_vec())
        })
    }

    async fn verify(&self, key: &VerKey, bytes: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(keys::verify(key, bytes, signature).is_ok())
    }

    async fn encrypt_for(
        &self,
        recipients: &[VerKey],
        sender: &VerKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        self.read(|data| {
            let local = data
                .keys
                .get(sender)
                .ok_or_else(|| Error::UnknownKey(sender.to_string()))?;
            authcrypt::seal(local, recipients, plaintext)
        })
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Decrypted> {
        self.read(|data| authcrypt::open(ciphertext, |kid| data.keys.get(kid)))
    }

    async fn resolve_identifier_for_key(&self, key: &VerKey) -> Result<Option<Did>> {
        self.read(|data| {
            let found = data
                .my_dids
                .iter()
                .chain(data.their_dids.iter())
                .find(|(_, k)| *k == key)
                .map(|(did, _)| did.clone());
            Ok(found)
        })
    }

    async fn store_counterpart(&self, did: &Did, key: &VerKey) -> Result<()> {
        self.write(|data| {
            data.their_dids.insert(did.clone(), *key);
            Ok(())
        })
    }

    async fn set_metadata(&self, did: &Did, metadata: Value) -> Result<()> {
        self.write(|data| {
            data.metadata.insert(did.clone(), metadata);
            Ok(())
        })
    }

    async fn get_metadata(&self, did: &Did) -> Result<Option<Value>> {
        self.read(|data| Ok(data.metadata.get(did).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_closed_wallet_is_not_initialized() {
        let wallet = MemoryWallet::new("closed");
        assert!(matches!(
            wallet.create_key().await,
            Err(Error::NotInitialized)
        ));

        wallet.open();
        let key = wallet.create_key().await.unwrap();
        wallet.close();
        assert!(matches!(
            wallet.sign(&key, b"data").await,
            Err(Error::NotInitialized)
        ));

        wallet.open();
        assert!(wallet.sign(&key, b"data").await.is_ok());
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let wallet = MemoryWallet::opened("signer");
        let (_, verkey) = wallet.create_local_identifier().await.unwrap();

        let sig = wallet.sign(&verkey, b"message").await.unwrap();
        assert!(wallet.verify(&verkey, b"message", &sig).await.unwrap());
        assert!(!wallet.verify(&verkey, b"tampered", &sig).await.unwrap());
    }

    #[tokio::test]
    async fn test_encrypt_between_wallets() {
        let alice = MemoryWallet::opened("alice");
        let bob = MemoryWallet::opened("bob");
        let (_, alice_key) = alice.create_local_identifier().await.unwrap();
        let (_, bob_key) = bob.create_local_identifier().await.unwrap();

        let sealed = alice
            .encrypt_for(&[bob_key], &alice_key, b"hi bob")
            .await
            .unwrap();
        let opened = bob.decrypt(&sealed).await.unwrap();

        assert_eq!(opened.plaintext, b"hi bob");
        assert_eq!(opened.sender_verkey, Some(alice_key));
        assert_eq!(opened.recipient_verkey, bob_key);

        assert!(alice.decrypt(&sealed).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_identifier_for_key() {
        let wallet = MemoryWallet::opened("resolver");
        let (my_did, my_key) = wallet.create_local_identifier().await.unwrap();
        let their = LocalKey::generate().verkey();

        assert_eq!(
            wallet.resolve_identifier_for_key(&my_key).await.unwrap(),
            Some(my_did)
        );
        assert_eq!(wallet.resolve_identifier_for_key(&their).await.unwrap(), None);

        wallet.store_counterpart(&their.did(), &their).await.unwrap();
        assert_eq!(
            wallet.resolve_identifier_for_key(&their).await.unwrap(),
            Some(their.did())
        );
    }

    #[tokio::test]
    async fn test_metadata() {
        let wallet = MemoryWallet::opened("meta");
        let (did, _) = wallet.create_local_identifier().await.unwrap();

        assert_eq!(wallet.get_metadata(&did).await.unwrap(), None);
        wallet
            .set_metadata(&did, json!({"label": "Doctor"}))
            .await
            .unwrap();
        assert_eq!(
            wallet.get_metadata(&did).await.unwrap(),
            Some(json!({"label": "Doctor"}))
        );
    }
}
