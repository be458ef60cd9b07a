//! Register, replace, delete and clear.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{FixedClock, unix_seconds};
use crate::context::ContextOptions;
use crate::e2e_tests::helpers::*;
use crate::error::{ErrorKind, RegistryError};
use crate::registry::Registry;

#[test]
fn test_unregistered_purpose_not_found() {
    let registry = Registry::new();
    for purpose in ["foo", "noExpiry", ""] {
        assert!(registry.lookup(purpose).is_none());
    }
}

#[test]
fn test_register_rejects_empty_arguments() {
    let registry = setup_registry();
    let before = registry.purposes();

    let err = registry
        .register("", "flame", ContextOptions::new())
        .expect_err("empty purpose");
    assert_eq!(err.to_string(), "purpose must be provided");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = registry
        .register("noExpiry", "", ContextOptions::new())
        .expect_err("empty issuer");
    assert_eq!(err.to_string(), "issuer must be provided");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(registry.purposes(), before);
    let context = registry.lookup("noExpiry").expect("prior entry untouched");
    assert_eq!(context.issuer(), "flame");
    assert_eq!(context.signing_key_name(), "key1");
}

#[test]
fn test_registered_context_reflects_options() {
    let registry = Registry::new();
    registry
        .register(
            "foo",
            "flame",
            ContextOptions::new()
                .with_keyset(keyset())
                .with_signing_key_name("key1")
                .with_signing_validity_period(Duration::from_secs(3600)),
        )
        .expect("registered");

    let context = registry.lookup("foo").expect("context present");
    assert_eq!(context.purpose(), "foo");
    assert_eq!(context.issuer(), "flame");
    assert_eq!(context.keyset().map(|keyset| keyset.len()), Some(1));
    assert_eq!(context.signing_key_name(), "key1");
    assert_eq!(context.signing_validity_period(), Duration::from_secs(3600));
    assert_eq!(format!("{:?}", context.clock()), "SystemClock");
}

#[test]
fn test_context_clock_drives_sign_but_not_validate() {
    let registry = Registry::new();
    registry
        .register(
            "pinned",
            "flame",
            ContextOptions::new()
                .with_keyset(keyset())
                .with_signing_key_name("key1")
                .with_signing_validity_period(Duration::from_secs(60))
                .with_clock(Arc::new(FixedClock::new(1111))),
        )
        .expect("registered");

    let context = registry.lookup("pinned").expect("context present");
    assert_eq!(unix_seconds(context.clock().now()), 1111);

    let token = registry
        .sign("pinned", &HashMap::new(), None)
        .expect("signed");
    assert_eq!(decode_payload(&token)["exp"], 1171);

    // Without an explicit clock validation runs at wall-clock time, long
    // after `exp`.
    let err = registry
        .validate("pinned", &token, None)
        .expect_err("expired at wall-clock time");
    assert_eq!(err.to_string(), "\"exp\" not satisfied");

    assert!(
        registry
            .validate("pinned", &token, Some(&FixedClock::new(1150)))
            .is_ok()
    );
}

#[test]
fn test_reregister_replaces_context() {
    let registry = setup_registry();
    let token = registry
        .sign("noExpiry", &HashMap::new(), Some(&FixedClock::new(1111)))
        .expect("signed");

    registry
        .register(
            "noExpiry",
            "ember",
            ContextOptions::new()
                .with_keyset(keyset())
                .with_signing_key_name("key1"),
        )
        .expect("re-registered");

    // Tokens from the old issuer no longer validate.
    let result = registry.validate("noExpiry", &token, Some(&FixedClock::new(2222)));
    assert_eq!(
        result.map_err(|e| e.to_string()),
        Err("\"iss\" not satisfied: values do not match".to_string())
    );

    let token = registry
        .sign("noExpiry", &HashMap::new(), Some(&FixedClock::new(1111)))
        .expect("signed");
    assert_eq!(decode_payload(&token)["iss"], "ember");
}

#[test]
fn test_delete() {
    let registry = setup_registry();
    assert!(registry.lookup("noExpiry").is_some());

    registry.delete("noExpiry");
    assert!(registry.lookup("noExpiry").is_none());
    assert_eq!(
        registry.sign("noExpiry", &HashMap::new(), None),
        Err(RegistryError::ContextNotFound)
    );

    // Deleting an absent purpose is a no-op.
    let before = registry.purposes();
    registry.delete("noExpiry");
    assert_eq!(registry.purposes(), before);
}

#[test]
fn test_clear() {
    let registry = setup_registry();
    let purposes = registry.purposes();
    assert_eq!(purposes.len(), 6);

    registry.clear();
    assert!(registry.is_empty());
    for purpose in &purposes {
        assert!(registry.lookup(purpose).is_none(), "{purpose} survived clear");
    }

    // The registry stays usable after a clear.
    registry
        .register("fresh", "flame", ContextOptions::new())
        .expect("registered");
    assert_eq!(registry.purposes(), vec!["fresh".to_string()]);
}
