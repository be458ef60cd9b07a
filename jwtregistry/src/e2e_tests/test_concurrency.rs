//! Concurrent register, sign, validate and delete.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::clock::FixedClock;
use crate::context::ContextOptions;
use crate::e2e_tests::helpers::*;
use crate::error::RegistryError;
use crate::keyset::KeySet;
use crate::registry::Registry;

const THREADS: usize = 4;
const ITERATIONS: usize = 200;

/// Issuer "short" always has a 60s validity period, issuer "long" always 3600s.
#[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected
fn options_for(issuer: &str, keyset: &Arc<KeySet>) -> ContextOptions {
    let period = if issuer == "short" { 60 } else { 3600 };
    ContextOptions::new()
        .with_keyset(Arc::clone(keyset))
        .with_signing_key_name("key1")
        .with_signing_validity_period(Duration::from_secs(period))
}

#[test]
fn test_signers_never_observe_a_mixed_context() {
    let registry = Registry::new();
    let keyset = keyset();
    registry
        .register("rotating", "short", options_for("short", &keyset))
        .expect("registered");

    thread::scope(|scope| {
        for writer in 0..THREADS {
            let registry = &registry;
            let keyset = &keyset;
            scope.spawn(move || {
                for i in 0..ITERATIONS {
                    let issuer = if (i + writer) % 2 == 0 { "short" } else { "long" };
                    registry
                        .register("rotating", issuer, options_for(issuer, keyset))
                        .expect("registered");
                }
            });
        }

        for _ in 0..THREADS {
            let registry = &registry;
            scope.spawn(move || {
                for _ in 0..ITERATIONS {
                    let token = registry
                        .sign("rotating", &HashMap::new(), Some(&FixedClock::new(1111)))
                        .expect("signed");
                    let payload = decode_payload(&token);
                    let expected_exp = match payload["iss"].as_str() {
                        Some("short") => 1171,
                        Some("long") => 4711,
                        other => panic!("unexpected issuer {other:?}"),
                    };
                    assert_eq!(payload["exp"], Value::from(expected_exp));
                }
            });
        }
    });
}

#[test]
fn test_concurrent_delete_and_validate() {
    let registry = setup_registry();

    thread::scope(|scope| {
        let registry = &registry;
        scope.spawn(move || {
            for _ in 0..ITERATIONS {
                registry.delete("noExpiry");
                registry
                    .register(
                        "noExpiry",
                        "flame",
                        ContextOptions::new()
                            .with_keyset(keyset())
                            .with_signing_key_name("key1"),
                    )
                    .expect("registered");
            }
        });

        for _ in 0..THREADS {
            scope.spawn(move || {
                for _ in 0..ITERATIONS {
                    match registry.validate("noExpiry", NO_EXPIRY_TOKEN, Some(&FixedClock::new(2222))) {
                        Ok(claims) => assert!(claims.is_empty()),
                        Err(e) => assert_eq!(e, RegistryError::ContextNotFound),
                    }
                }
            });
        }
    });

    assert!(registry.lookup("noExpiry").is_some());
}

#[test]
fn test_concurrent_registration_of_distinct_purposes() {
    let registry = Registry::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let registry = &registry;
            scope.spawn(move || {
                for i in 0..ITERATIONS {
                    registry
                        .register(format!("purpose-{t}-{i}"), "flame", ContextOptions::new())
                        .expect("registered");
                }
            });
        }
    });

    assert_eq!(registry.len(), THREADS * ITERATIONS);
}
