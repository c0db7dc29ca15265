#![no_main]

use chatnest_core::core_chat::{normalize_email, InvitationId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(id) = InvitationId::parse(text) {
            assert_eq!(InvitationId::parse(&id.to_string()).ok(), Some(id));
        }

        // Normalization is idempotent
        if let Ok(email) = normalize_email(text) {
            assert_eq!(normalize_email(&email).ok(), Some(email));
        }
    }
});
