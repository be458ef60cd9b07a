//! Validation through the registry with the real codec.

use crate::clock::FixedClock;
use crate::codec::VerificationError;
use crate::e2e_tests::helpers::*;
use crate::error::{ErrorKind, RegistryError};

#[test]
fn test_validate_no_such_context() {
    let registry = setup_registry();
    let result = registry.validate("noSuchContext", b"", Some(&FixedClock::new(1111)));

    assert_eq!(result, Err(RegistryError::ContextNotFound));
}

#[test]
fn test_validate_no_keyset() {
    let registry = setup_registry();
    let result = registry.validate("noKeyset", b"", Some(&FixedClock::new(1111)));

    let err = result.expect_err("no keyset");
    assert_eq!(err.to_string(), "keyset is empty");
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
}

#[test]
fn test_validate_no_expiry_used_after_start() {
    let registry = setup_registry();
    let claims = registry
        .validate("noExpiry", NO_EXPIRY_TOKEN, Some(&FixedClock::new(2222)))
        .expect("valid token");

    assert!(claims.is_empty());
}

#[test]
fn test_validate_no_expiry_used_before_start() {
    let registry = setup_registry();
    let err = registry
        .validate("noExpiry", NO_EXPIRY_TOKEN, Some(&FixedClock::new(50)))
        .expect_err("not yet issued");

    assert_eq!(err.to_string(), "\"iat\" not satisfied");
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);
}

#[test]
fn test_validate_expiry_used_after_expired() {
    let registry = setup_registry();
    let err = registry
        .validate("expiry", EXPIRY_TOKEN, Some(&FixedClock::new(10_000)))
        .expect_err("expired");

    assert_eq!(err.to_string(), "\"exp\" not satisfied");
}

#[test]
fn test_validate_expiry_used_within_window() {
    let registry = setup_registry();
    let claims = registry
        .validate("expiry", EXPIRY_TOKEN, Some(&FixedClock::new(1150)))
        .expect("valid token");

    assert!(claims.is_empty());
}

#[test]
fn test_validate_custom_claims() {
    let registry = setup_registry();
    let validated = registry
        .validate("noExpiry", CUSTOM_CLAIMS_TOKEN, Some(&FixedClock::new(2222)))
        .expect("valid token");

    assert_eq!(validated, claims(&[("foo", "bar")]));
}

#[test]
fn test_validate_wrong_issuer() {
    let registry = setup_registry();
    let err = registry
        .validate("wrongIssuer", CUSTOM_CLAIMS_TOKEN, Some(&FixedClock::new(2222)))
        .expect_err("issuer mismatch");

    assert_eq!(err.to_string(), "\"iss\" not satisfied: values do not match");
    assert_eq!(
        err,
        RegistryError::Verification(VerificationError::IssuerMismatch)
    );
}

#[test]
fn test_validate_accepts_bytes() {
    let registry = setup_registry();
    let result = registry.validate(
        "noExpiry",
        NO_EXPIRY_TOKEN.as_bytes().to_vec(),
        Some(&FixedClock::new(2222)),
    );

    assert!(result.is_ok());
}

#[test]
fn test_validate_tampered_payload() {
    let registry = setup_registry();
    // Swap in the payload of another token, keeping the first signature.
    let parts: Vec<&str> = NO_EXPIRY_TOKEN.split('.').collect();
    let other_payload = CUSTOM_CLAIMS_TOKEN.split('.').nth(1).expect("payload");
    let tampered = format!("{}.{}.{}", parts[0], other_payload, parts[2]);

    let result = registry.validate("noExpiry", tampered, Some(&FixedClock::new(2222)));
    assert_eq!(
        result,
        Err(RegistryError::Verification(VerificationError::InvalidSignature))
    );
}

#[test]
fn test_validate_malformed_token() {
    let registry = setup_registry();
    let result = registry.validate("noExpiry", "not-a-valid-jwt", Some(&FixedClock::new(2222)));

    assert!(matches!(
        result,
        Err(RegistryError::Verification(VerificationError::Malformed(_)))
    ));
}

#[test]
fn test_sign_then_validate_round_trip() {
    let registry = setup_registry();
    let token = registry
        .sign(
            "expiry",
            &claims(&[("foo", "bar"), ("role", "admin")]),
            Some(&FixedClock::new(1111)),
        )
        .expect("signed");

    let validated = registry
        .validate("expiry", &token, Some(&FixedClock::new(1170)))
        .expect("valid token");
    assert_eq!(validated, claims(&[("foo", "bar"), ("role", "admin")]));

    let expired = registry.validate("expiry", &token, Some(&FixedClock::new(1171)));
    assert_eq!(
        expired,
        Err(RegistryError::Verification(VerificationError::Expired))
    );
}
