//! Fuzz target for envelope decryption.
//!
//! Every frame on the relay reaches every agent, so opening must fail
//! cleanly on whatever bytes arrive.

#![no_main]

use libfuzzer_sys::fuzz_target;
use medic_core::{authcrypt, LocalKey};

fuzz_target!(|data: &[u8]| {
    let local = LocalKey::from_bytes(&[7u8; 32]);
    let verkey = local.verkey();
    let _ = authcrypt::open(data, |kid| (*kid == verkey).then_some(&local));
});
