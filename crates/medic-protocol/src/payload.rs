//! Signed `data` payloads carried by credential and proof messages.

use crate::error::{ProtocolError, Result};
use medic_core::{sign_field, verify_field, Identity, SignedField, VerKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A message body of `{data, signature}` where `signature` signs `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPayload<T> {
    pub data: T,
    pub signature: SignedField,
}

impl<T> SignedPayload<T>
where
    T: Serialize + DeserializeOwned,
{
    pub async fn seal(identity: &dyn Identity, data: T, signer: &VerKey) -> Result<Self> {
        let signature = sign_field(identity, &data, signer).await?;
        Ok(Self { data, signature })
    }

    /// Check the signature is by `expected_signer`, holds, and covers exactly `data`.
    pub async fn open(self, identity: &dyn Identity, expected_signer: &VerKey) -> Result<T> {
        if self.signature.signer != *expected_signer {
            return Err(ProtocolError::SignatureInvalid(format!(
                "signed by {}, expected {}",
                self.signature.signer, expected_signer
            )));
        }

        let field = verify_field(identity, &self.signature).await?;
        if !field.verified {
            return Err(ProtocolError::SignatureInvalid(
                "payload signature does not verify".into(),
            ));
        }

        let data = serde_json::to_value(&self.data)
            .map_err(|e| ProtocolError::Encoding(e.to_string()))?;
        if field.value != data {
            return Err(ProtocolError::SignatureInvalid(
                "signature does not cover the payload".into(),
            ));
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medic_core::MemoryWallet;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_open_checks_signer_and_coverage() {
        let wallet = MemoryWallet::opened("payload");
        let key = wallet.create_key().await.unwrap();
        let other = wallet.create_key().await.unwrap();

        let sealed = SignedPayload::seal(&wallet, json!({"nonce": 1}), &key)
            .await
            .unwrap();
        assert_eq!(
            sealed.clone().open(&wallet, &key).await.unwrap(),
            json!({"nonce": 1})
        );

        assert!(matches!(
            sealed.clone().open(&wallet, &other).await,
            Err(ProtocolError::SignatureInvalid(_))
        ));

        let mut swapped: SignedPayload<Value> = sealed;
        swapped.data = json!({"nonce": 2});
        assert!(matches!(
            swapped.open(&wallet, &key).await,
            Err(ProtocolError::SignatureInvalid(_))
        ));
    }
}
