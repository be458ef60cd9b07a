//! Signing through the registry with the real codec.

use std::collections::HashMap;

use jsonwebtoken::{Algorithm, decode_header};
use serde_json::json;

use crate::clock::FixedClock;
use crate::e2e_tests::helpers::*;
use crate::error::{ErrorKind, RegistryError};

#[test]
fn test_sign_configuration_errors() {
    let registry = setup_registry();

    let cases = [
        ("noSuchContext", "context not found in registry", ErrorKind::NotFound),
        ("noKeyset", "keyset is empty", ErrorKind::InvalidConfiguration),
        ("wrongKeyName", "key is not in the keyset", ErrorKind::InvalidConfiguration),
        ("noSigningKeyNameSet", "signing key not set", ErrorKind::InvalidConfiguration),
    ];
    for (purpose, message, kind) in cases {
        let err = registry
            .sign(purpose, &HashMap::new(), Some(&FixedClock::new(1111)))
            .expect_err("signing must fail");
        assert_eq!(err.to_string(), message, "purpose {purpose}");
        assert_eq!(err.kind(), kind, "purpose {purpose}");
    }
}

#[test]
fn test_sign_no_expiry() {
    let registry = setup_registry();
    let token = registry
        .sign("noExpiry", &HashMap::new(), Some(&FixedClock::new(1111)))
        .expect("signed");

    assert_eq!(decode_payload(&token), json!({"iat": 1111, "iss": "flame"}));
}

#[test]
fn test_sign_expiry() {
    let registry = setup_registry();
    let token = registry
        .sign("expiry", &HashMap::new(), Some(&FixedClock::new(1111)))
        .expect("signed");

    assert_eq!(
        decode_payload(&token),
        json!({"iat": 1111, "exp": 1171, "iss": "flame"})
    );
}

#[test]
fn test_sign_extra_claims() {
    let registry = setup_registry();
    let token = registry
        .sign("noExpiry", &claims(&[("foo", "bar")]), Some(&FixedClock::new(1111)))
        .expect("signed");

    assert_eq!(
        decode_payload(&token),
        json!({"iat": 1111, "iss": "flame", "foo": "bar"})
    );
}

#[test]
fn test_sign_header_names_key_and_algorithm() {
    let registry = setup_registry();
    let token = registry
        .sign("noExpiry", &HashMap::new(), Some(&FixedClock::new(1111)))
        .expect("signed");

    let header = decode_header(&token).expect("valid header");
    assert_eq!(header.alg, Algorithm::HS256);
    assert_eq!(header.kid.as_deref(), Some("key1"));
}

#[test]
fn test_sign_without_clock_uses_current_time() {
    let registry = setup_registry();
    let before = crate::clock::unix_seconds(std::time::SystemTime::now());
    let token = registry
        .sign("noExpiry", &HashMap::new(), None)
        .expect("signed");
    let after = crate::clock::unix_seconds(std::time::SystemTime::now());

    let iat = decode_payload(&token)["iat"].as_i64().expect("iat is a number");
    assert!(before <= iat && iat <= after, "iat {iat} not in [{before}, {after}]");
}

#[test]
fn test_sign_with_unset_fixed_clock_uses_current_time() {
    let registry = setup_registry();
    let token = registry
        .sign("noExpiry", &HashMap::new(), Some(&FixedClock::default()))
        .expect("signed");

    let iat = decode_payload(&token)["iat"].as_i64().expect("iat is a number");
    assert!(iat > 1_577_836_800); // 2020-01-01 00:00:00 UTC
}

#[test]
fn test_failed_sign_leaves_registry_unchanged() {
    let registry = setup_registry();
    let before = registry.purposes();

    let result = registry.sign("wrongKeyName", &HashMap::new(), None);
    assert_eq!(result, Err(RegistryError::KeyNotInKeyset));
    assert_eq!(registry.purposes(), before);
}
