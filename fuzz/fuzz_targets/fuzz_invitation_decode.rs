//! Fuzz target for invitation codes.
//!
//! Invitation codes are pasted in by users, so decoding must reject
//! anything malformed without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use medic_protocol::Invitation;

fuzz_target!(|data: &[u8]| {
    if let Ok(code) = std::str::from_utf8(data) {
        if let Ok(invitation) = Invitation::decode(code) {
            // A decoded invitation always names a connection key
            assert!(invitation.connection_key().is_ok());
        }
    }
});
