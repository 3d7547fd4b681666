//! Connection handshake messages.

use crate::error::{ProtocolError, Result};
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use medic_core::{ConnectionInfo, Message, SignedField, VerKey};
use serde::{Deserialize, Serialize};

pub const INVITATION: &str = "connections/1.0/invitation";
pub const REQUEST: &str = "connections/1.0/request";
pub const RESPONSE: &str = "connections/1.0/response";

/// Accepts invitation codes with or without padding.
const INVITATION_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An out-of-band invitation to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    pub label: String,
    /// Whether the inviter had finished issuer setup when inviting.
    #[serde(default)]
    pub initialized: bool,
    #[serde(rename = "recipientKeys")]
    pub recipient_keys: Vec<VerKey>,
}

impl Invitation {
    pub fn new(label: impl Into<String>, connection_key: VerKey, initialized: bool) -> Self {
        Self {
            type_: INVITATION.to_string(),
            id: uuid::Uuid::now_v7().to_string(),
            label: label.into(),
            initialized,
            recipient_keys: vec![connection_key],
        }
    }

    /// The key a connection request must be sent to.
    pub fn connection_key(&self) -> Result<VerKey> {
        self.recipient_keys
            .first()
            .copied()
            .ok_or(ProtocolError::MissingField("recipientKeys"))
    }

    /// Portable code: padded base64url of the JSON invitation.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| ProtocolError::Encoding(e.to_string()))?;
        Ok(URL_SAFE.encode(json))
    }

    pub fn decode(code: &str) -> Result<Self> {
        let bytes = INVITATION_DECODER
            .decode(code.trim())
            .map_err(|e| ProtocolError::Decoding(format!("invitation code: {e}")))?;
        let invitation: Invitation = serde_json::from_slice(&bytes)
            .map_err(|e| ProtocolError::Decoding(format!("invitation: {e}")))?;

        if invitation.type_ != INVITATION {
            return Err(ProtocolError::UnknownMessageType(invitation.type_));
        }
        if invitation.recipient_keys.is_empty() {
            return Err(ProtocolError::Decoding("invitation has no recipient keys".into()));
        }
        Ok(invitation)
    }

    /// The invitation as a generic message, for history records.
    pub fn to_message(&self) -> Result<Message> {
        let value = serde_json::to_value(self).map_err(|e| ProtocolError::Encoding(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| ProtocolError::Encoding(e.to_string()))
    }
}

/// Sent by the invitee to the invitation's connection key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub label: String,
    pub connection: ConnectionInfo,
}

/// Sent by the inviter; the signed field carries its pairwise `{DID, DIDDoc}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    #[serde(rename = "connection~sig")]
    pub connection_sig: SignedField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    Request(ConnectionRequest),
    Response(ConnectionResponse),
}

impl ConnectionMessage {
    pub fn from_message(message: &Message) -> Result<Self> {
        match message.type_.as_str() {
            REQUEST => Ok(Self::Request(message.body_as()?)),
            RESPONSE => Ok(Self::Response(message.body_as()?)),
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }

    pub fn type_(&self) -> &'static str {
        match self {
            Self::Request(_) => REQUEST,
            Self::Response(_) => RESPONSE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medic_core::LocalKey;
    use proptest::prelude::*;

    fn invitation(label: &str) -> Invitation {
        Invitation::new(label, LocalKey::generate().verkey(), true)
    }

    #[test]
    fn test_code_roundtrip_is_byte_exact() {
        let invite = invitation("Steward");
        let code = invite.encode().unwrap();
        let decoded = Invitation::decode(&code).unwrap();
        assert_eq!(decoded, invite);
        assert_eq!(decoded.encode().unwrap(), code);
    }

    #[test]
    fn test_unpadded_code_accepted() {
        let invite = invitation("Doctor");
        let code = invite.encode().unwrap();
        let unpadded = code.trim_end_matches('=');
        assert_eq!(Invitation::decode(unpadded).unwrap(), invite);
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let mut invite = invitation("Mallory");
        invite.type_ = REQUEST.to_string();
        let code = invite.encode().unwrap();
        assert!(matches!(
            Invitation::decode(&code),
            Err(ProtocolError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn test_empty_recipient_keys_rejected() {
        let mut invite = invitation("Nobody");
        invite.recipient_keys.clear();
        let code = invite.encode().unwrap();
        assert!(matches!(
            Invitation::decode(&code),
            Err(ProtocolError::Decoding(_))
        ));
    }

    #[test]
    fn test_garbage_code_rejected() {
        assert!(matches!(
            Invitation::decode("not*base64"),
            Err(ProtocolError::Decoding(_))
        ));
    }

    #[test]
    fn test_history_message_keeps_type_and_id() {
        let invite = invitation("Steward");
        let message = invite.to_message().unwrap();
        assert_eq!(message.type_, INVITATION);
        assert_eq!(message.id, invite.id);
        assert_eq!(message.body["label"], "Steward");
        assert!(!message.body.contains_key("@type"));
    }

    #[test]
    fn test_unknown_connection_tag_rejected() {
        let message = Message::new("connections/1.0/ping", &serde_json::json!({})).unwrap();
        assert!(matches!(
            ConnectionMessage::from_message(&message),
            Err(ProtocolError::UnknownMessageType(_))
        ));
    }

    proptest! {
        #[test]
        fn test_any_label_roundtrips(label in ".{0,64}", initialized in any::<bool>()) {
            let invite = Invitation::new(label, LocalKey::generate().verkey(), initialized);
            let code = invite.encode().unwrap();
            let decoded = Invitation::decode(&code).unwrap();
            prop_assert_eq!(&decoded, &invite);
            prop_assert_eq!(decoded.encode().unwrap(), code);
        }
    }
}
