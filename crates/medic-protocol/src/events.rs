//! Events published to the UI layer.

use medic_core::{Did, VerKey};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    InvitationReceived {
        connection_key: VerKey,
        label: String,
    },
    ConnectionRequested {
        connection_key: VerKey,
        label: String,
        their_did: Did,
    },
    ConnectionEstablished {
        my_did: Did,
        their_did: Did,
        label: String,
    },
    CredentialOffered {
        schema_type: String,
        their_did: Did,
    },
    CredentialOfferReceived {
        schema_type: String,
        their_did: Did,
    },
    CredentialIssued {
        schema_type: String,
        their_did: Did,
    },
    CredentialStored {
        schema_type: String,
        their_did: Did,
    },
    ProofOfferReceived {
        their_did: Did,
        nonce: u64,
    },
    ProofRequested {
        their_did: Did,
    },
    ProofSent {
        their_did: Did,
    },
    ProofVerified {
        their_did: Did,
        verified: bool,
    },
    /// An inbound message was dropped or an exchange aborted.
    ExchangeAborted {
        message_type: String,
        reason: String,
    },
}
