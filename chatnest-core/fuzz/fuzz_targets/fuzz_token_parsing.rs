#![no_main]

use chatnest_core::core_chat::{TokenCodec, TokenSecret};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let codec = TokenCodec::new(TokenSecret::from_bytes([7u8; 32]));

    // Arbitrary input must be rejected cleanly, never accepted
    if let Ok(text) = std::str::from_utf8(data) {
        assert!(codec.parse(text).is_err());
    }
});
