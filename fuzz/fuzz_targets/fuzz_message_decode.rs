//! Fuzz target for inbound message bodies.
//!
//! Parses arbitrary JSON as a message, then into each protocol's closed
//! set of message types.

#![no_main]

use libfuzzer_sys::fuzz_target;
use medic_core::{Did, Message};
use medic_protocol::connection::ConnectionMessage;
use medic_protocol::credential::CredentialMessage;
use medic_protocol::proof::ProofMessage;
use std::str::FromStr;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = serde_json::from_slice::<Message>(data) {
        let _ = ConnectionMessage::from_message(&message);
        let _ = CredentialMessage::from_message(&message);
        let _ = ProofMessage::from_message(&message);
    }

    if let Ok(input) = std::str::from_utf8(data) {
        let _ = Did::from_str(input);
    }
});
