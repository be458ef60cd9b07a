//! The process-wide registry.
//!
//! Other tests use their own `Registry`; this is the only test touching the
//! global one, so clearing it here cannot race with anything.

use std::collections::HashMap;
use std::thread;

use crate::clock::FixedClock;
use crate::context::ContextOptions;
use crate::e2e_tests::helpers::*;
use crate::error::RegistryError;
use crate::registry::{self, Registry};

#[test]
fn test_global_registry_operations() {
    // Concurrent first use initializes exactly one registry.
    let instances: Vec<&'static Registry> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4).map(|_| scope.spawn(registry::global)).collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread finished"))
            .collect()
    });
    assert!(instances.iter().all(|r| std::ptr::eq(*r, instances[0])));

    registry::register(
        "noExpiry",
        "flame",
        ContextOptions::new()
            .with_keyset(keyset())
            .with_signing_key_name("key1"),
    )
    .expect("registered");

    let token = registry::sign("noExpiry", &HashMap::new(), Some(&FixedClock::new(1111)))
        .expect("signed");
    assert_eq!(
        decode_payload(&token),
        serde_json::json!({"iat": 1111, "iss": "flame"})
    );

    let claims = registry::validate("noExpiry", &token, Some(&FixedClock::new(2222)))
        .expect("valid token");
    assert!(claims.is_empty());

    let err = registry::validate("noExpiry", &token, Some(&FixedClock::new(50)))
        .expect_err("not yet issued");
    assert_eq!(err.to_string(), "\"iat\" not satisfied");

    registry::delete("noExpiry");
    assert!(registry::lookup("noExpiry").is_none());

    registry::register("other", "flame", ContextOptions::new()).expect("registered");
    registry::clear();
    assert!(registry::lookup("other").is_none());
    assert_eq!(
        registry::sign("other", &HashMap::new(), None),
        Err(RegistryError::ContextNotFound)
    );
}
