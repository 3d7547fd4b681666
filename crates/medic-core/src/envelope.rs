//! Envelope codec: structured messages to and from opaque wire bytes.

use crate::identity::Identity;
use crate::message::{Message, MessageContext};
use crate::{Error, Result, VerKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// An opened envelope: the message plus the keys it travelled between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unpacked {
    pub message: Message,
    pub sender_verkey: Option<VerKey>,
    pub recipient_verkey: VerKey,
}

/// Packs and unpacks messages through an [`Identity`] backend.
#[derive(Clone)]
pub struct EnvelopeCodec {
    identity: Arc<dyn Identity>,
}

impl EnvelopeCodec {
    pub fn new(identity: Arc<dyn Identity>) -> Self {
        Self { identity }
    }

    /// Encrypt `message` from `sender` to `recipients`.
    pub async fn pack(
        &self,
        message: &Message,
        recipients: &[VerKey],
        sender: &VerKey,
    ) -> Result<Vec<u8>> {
        if recipients.is_empty() {
            return Err(Error::RecipientKey);
        }
        let plaintext = serde_json::to_vec(message).map_err(|e| Error::Encoding(e.to_string()))?;
        let bytes = self
            .identity
            .encrypt_for(recipients, sender, &plaintext)
            .await?;
        debug!(
            message_type = %message.type_,
            recipients = recipients.len(),
            size = bytes.len(),
            "packed message"
        );
        Ok(bytes)
    }

    /// Decrypt an envelope and resolve its keys to known identifiers.
    pub async fn unpack(&self, bytes: &[u8]) -> Result<(Message, MessageContext)> {
        let opened = self.open(bytes).await?;

        let from_did = match &opened.sender_verkey {
            Some(key) => self.identity.resolve_identifier_for_key(key).await?,
            None => None,
        };
        let to_did = self
            .identity
            .resolve_identifier_for_key(&opened.recipient_verkey)
            .await?;

        let context = MessageContext {
            from_key: opened.sender_verkey,
            to_key: Some(opened.recipient_verkey),
            from_did,
            to_did,
        };
        Ok((opened.message, context))
    }

    /// Decrypt without resolving identifiers.
    pub async fn open(&self, bytes: &[u8]) -> Result<Unpacked> {
        let decrypted = self.identity.decrypt(bytes).await?;
        let message: Message = serde_json::from_slice(&decrypted.plaintext)
            .map_err(|e| Error::Decoding(format!("envelope payload: {e}")))?;
        Ok(Unpacked {
            message,
            sender_verkey: decrypted.sender_verkey,
            recipient_verkey: decrypted.recipient_verkey,
        })
    }

    /// Read any inbound frame.
    ///
    /// A frame that already is a plaintext message passes through unchanged
    /// with no context; anything else must be an envelope.
    pub async fn read(&self, bytes: &[u8]) -> Result<(Message, Option<MessageContext>)> {
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(bytes) {
            if map.contains_key("@type") {
                let message: Message = serde_json::from_value(Value::Object(map))
                    .map_err(|e| Error::Decoding(e.to_string()))?;
                return Ok((message, None));
            }
        }
        let (message, context) = self.unpack(bytes).await?;
        Ok((message, Some(context)))
    }
}
