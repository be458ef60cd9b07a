//! Token signing and verification.
//!
//! The registry never touches cryptography directly: it hands claims and
//! keys to a `TokenCodec`. `JsonWebTokenCodec` is the production codec,
//! built on the `jsonwebtoken` crate.
//!
//! # Pre-conditions
//! - Keys passed to `sign` must hold private material.
//! - Tokens passed to `verify` are compact JWS strings.
//!
//! # Post-conditions
//! - A verified token's claims have passed the signature, issuer and time checks.
//! - Verification failures carry a message suitable for returning verbatim.
//!
//! # Invariants
//! - Codecs are stateless; the same inputs always produce the same outputs.
//! - Time checks use the instant in `Expectations`, never the system clock.

use std::fmt;
use std::time::SystemTime;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header, encode};
use serde_json::Value;

use crate::clock::unix_seconds;
use crate::keyset::{Key, KeySet};

/// A token's claim set.
pub type Claims = serde_json::Map<String, Value>;

/// What a verified token must satisfy beyond its signature.
#[derive(Debug, Clone, Copy)]
pub struct Expectations<'a> {
    /// Required value of the `iss` claim.
    pub issuer: &'a str,
    /// The instant `iat`, `exp` and `nbf` are evaluated against.
    pub now: SystemTime,
}

/// Error returned when signing fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The key has no private material.
    VerificationOnlyKey(String),
    /// The underlying library failed to produce a token.
    Encoding(String),
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerificationOnlyKey(kid) => write!(f, "key '{kid}' cannot sign"),
            Self::Encoding(reason) => write!(f, "failed to sign token: {reason}"),
        }
    }
}

impl std::error::Error for SignError {}

/// Error returned when a token fails verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The token is not a well-formed JWT.
    Malformed(String),
    /// The header names a key id that is not in the key set.
    UnknownKey(String),
    /// The header has no key id and no key uses the header's algorithm.
    NoMatchingKey(Algorithm),
    /// The header's algorithm differs from the key's algorithm.
    AlgorithmMismatch,
    /// The signature does not verify.
    InvalidSignature,
    /// The `iss` claim is absent or differs from the expected issuer.
    IssuerMismatch,
    /// The `iat` claim is in the future.
    NotYetIssued,
    /// The `exp` claim is in the past.
    Expired,
    /// The `nbf` claim is in the future.
    NotYetValid,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed token: {reason}"),
            Self::UnknownKey(kid) => write!(f, "key \"{kid}\" is not in the keyset"),
            Self::NoMatchingKey(algorithm) => {
                write!(f, "no key in the keyset uses algorithm {algorithm:?}")
            }
            Self::AlgorithmMismatch => write!(f, "token algorithm does not match the key"),
            Self::InvalidSignature => write!(f, "invalid signature"),
            Self::IssuerMismatch => write!(f, "\"iss\" not satisfied: values do not match"),
            Self::NotYetIssued => write!(f, "\"iat\" not satisfied"),
            Self::Expired => write!(f, "\"exp\" not satisfied"),
            Self::NotYetValid => write!(f, "\"nbf\" not satisfied"),
        }
    }
}

impl std::error::Error for VerificationError {}

/// The signing and verification capability the registry delegates to.
pub trait TokenCodec: Send + Sync + fmt::Debug {
    /// Sign `claims` with `key`, using the key's algorithm.
    ///
    /// # Errors
    /// Returns `SignError` if the key cannot sign or encoding fails.
    fn sign(&self, claims: &Claims, key: &Key) -> Result<String, SignError>;

    /// Verify `token` against `keyset` and return its claims.
    ///
    /// # Errors
    /// Returns `VerificationError` describing the first failed check.
    fn verify(
        &self,
        token: &[u8],
        keyset: &KeySet,
        expected: &Expectations<'_>,
    ) -> Result<Claims, VerificationError>;
}

/// `TokenCodec` backed by the `jsonwebtoken` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWebTokenCodec;

impl TokenCodec for JsonWebTokenCodec {
    fn sign(&self, claims: &Claims, key: &Key) -> Result<String, SignError> {
        let encoding_key = key
            .encoding_key()
            .ok_or_else(|| SignError::VerificationOnlyKey(key.kid().to_string()))?;

        let mut header = Header::new(key.algorithm());
        header.kid = Some(key.kid().to_string());

        encode(&header, claims, encoding_key).map_err(|e| SignError::Encoding(e.to_string()))
    }

    fn verify(
        &self,
        token: &[u8],
        keyset: &KeySet,
        expected: &Expectations<'_>,
    ) -> Result<Claims, VerificationError> {
        let token =
            std::str::from_utf8(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;
        let header = decode_header(token).map_err(map_jwt_error)?;

        let claims = match header.kid.as_deref() {
            Some(kid) => {
                let key = keyset
                    .find(kid)
                    .ok_or_else(|| VerificationError::UnknownKey(kid.to_string()))?;
                verify_signature(token, key)?
            }
            None => verify_with_any_key(token, keyset, header.alg)?,
        };

        check_claims(&claims, expected)?;
        Ok(claims)
    }
}

/// Try every key using `algorithm`, in key-set order.
///
/// Returns the first success, or the last failure.
fn verify_with_any_key(
    token: &str,
    keyset: &KeySet,
    algorithm: Algorithm,
) -> Result<Claims, VerificationError> {
    let mut failure = VerificationError::NoMatchingKey(algorithm);
    for key in keyset.iter().filter(|key| key.algorithm() == algorithm) {
        match verify_signature(token, key) {
            Ok(claims) => return Ok(claims),
            Err(e) => failure = e,
        }
    }
    Err(failure)
}

/// Check the signature only; claim checks happen in `check_claims` so they
/// can use a caller-supplied instant.
fn verify_signature(token: &str, key: &Key) -> Result<Claims, VerificationError> {
    let mut validation = Validation::new(key.algorithm());
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let token_data = decode::<Claims>(token, key.decoding_key(), &validation).map_err(map_jwt_error)?;
    Ok(token_data.claims)
}

/// Check `iss`, `iat`, `exp` and `nbf`, in that order.
fn check_claims(claims: &Claims, expected: &Expectations<'_>) -> Result<(), VerificationError> {
    let now = unix_seconds(expected.now);

    if claims.get("iss").and_then(Value::as_str) != Some(expected.issuer) {
        return Err(VerificationError::IssuerMismatch);
    }
    if let Some(issued_at) = numeric_claim(claims, "iat")? {
        if now < issued_at {
            return Err(VerificationError::NotYetIssued);
        }
    }
    if let Some(expires_at) = numeric_claim(claims, "exp")? {
        if now >= expires_at {
            return Err(VerificationError::Expired);
        }
    }
    if let Some(not_before) = numeric_claim(claims, "nbf")? {
        if now < not_before {
            return Err(VerificationError::NotYetValid);
        }
    }
    Ok(())
}

/// Read a NumericDate claim as whole seconds.
#[allow(clippy::cast_possible_truncation)] // Fractional dates are floored to seconds
fn numeric_claim(claims: &Claims, name: &str) -> Result<Option<i64>, VerificationError> {
    match claims.get(name) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.floor() as i64))
            .map(Some)
            .ok_or_else(|| VerificationError::Malformed(format!("\"{name}\" is out of range"))),
        Some(_) => Err(VerificationError::Malformed(format!(
            "\"{name}\" is not a number"
        ))),
    }
}

/// Maps jsonwebtoken errors to our `VerificationError` type.
fn map_jwt_error(error: jsonwebtoken::errors::Error) -> VerificationError {
    match error.kind() {
        ErrorKind::InvalidSignature => VerificationError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => VerificationError::AlgorithmMismatch,
        _ => VerificationError::Malformed(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_unix_seconds;
    use crate::keyset::tests::{EC_PRIVATE_KEY, EC_PUBLIC_KEY};
    use jsonwebtoken::EncodingKey;
    use serde_json::json;

    fn hmac_keyset(secret: &[u8]) -> KeySet {
        KeySet::new().with_key(Key::hmac("key1", Algorithm::HS256, secret).expect("valid key"))
    }

    fn claims(value: Value) -> Claims {
        match value {
            Value::Object(map) => map,
            _ => panic!("claims must be a JSON object"),
        }
    }

    fn expect_at(issuer: &str, seconds: i64) -> Expectations<'_> {
        Expectations {
            issuer,
            now: from_unix_seconds(seconds),
        }
    }

    fn sign_hmac(value: Value) -> String {
        let keyset = hmac_keyset(b"abcd1234");
        let key = keyset.find("key1").expect("key1 present");
        JsonWebTokenCodec
            .sign(&claims(value), key)
            .expect("failed to create test token")
    }

    #[test]
    fn test_sign_header_carries_kid_and_algorithm() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111}));
        let header = decode_header(&token).expect("valid header");

        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(header.kid.as_deref(), Some("key1"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn test_sign_then_verify_hs256() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111, "foo": "bar"}));
        let keyset = hmac_keyset(b"abcd1234");

        let verified = JsonWebTokenCodec
            .verify(token.as_bytes(), &keyset, &expect_at("flame", 2222))
            .expect("token verifies");

        assert_eq!(verified.get("foo"), Some(&json!("bar")));
        assert_eq!(verified.get("iat"), Some(&json!(1111)));
    }

    #[test]
    fn test_sign_then_verify_es256() {
        let key = Key::pem(
            "ec1",
            Algorithm::ES256,
            EC_PRIVATE_KEY.as_bytes(),
            EC_PUBLIC_KEY.as_bytes(),
        )
        .expect("valid EC pair");
        let token = JsonWebTokenCodec
            .sign(&claims(json!({"iss": "flame", "iat": 1111})), &key)
            .expect("signed");

        let verifier = KeySet::new().with_key(
            Key::verifying_pem("ec1", Algorithm::ES256, EC_PUBLIC_KEY.as_bytes())
                .expect("valid EC public key"),
        );
        let result = JsonWebTokenCodec.verify(token.as_bytes(), &verifier, &expect_at("flame", 2222));
        assert!(result.is_ok());
    }

    #[test]
    fn test_sign_with_verification_only_key() {
        let key = Key::verifying_pem("ec1", Algorithm::ES256, EC_PUBLIC_KEY.as_bytes())
            .expect("valid EC public key");
        let result = JsonWebTokenCodec.sign(&Claims::new(), &key);

        assert_eq!(result, Err(SignError::VerificationOnlyKey("ec1".to_string())));
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111}));
        let keyset = hmac_keyset(b"wrong-secret");

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2222));
        assert_eq!(result, Err(VerificationError::InvalidSignature));
    }

    #[test]
    fn test_verify_issuer_mismatch() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111}));
        let keyset = hmac_keyset(b"abcd1234");

        let result =
            JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("not-flame", 2222));
        assert_eq!(result, Err(VerificationError::IssuerMismatch));
    }

    #[test]
    fn test_verify_missing_issuer() {
        let token = sign_hmac(json!({"iat": 1111}));
        let keyset = hmac_keyset(b"abcd1234");

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2222));
        assert_eq!(result, Err(VerificationError::IssuerMismatch));
    }

    #[test]
    fn test_verify_issued_in_future() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111}));
        let keyset = hmac_keyset(b"abcd1234");

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 50));
        assert_eq!(result, Err(VerificationError::NotYetIssued));
    }

    #[test]
    fn test_verify_expiry_boundaries() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111, "exp": 1171}));
        let keyset = hmac_keyset(b"abcd1234");

        let before = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 1170));
        assert!(before.is_ok());

        let at = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 1171));
        assert_eq!(at, Err(VerificationError::Expired));

        let after = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 10_000));
        assert_eq!(after, Err(VerificationError::Expired));
    }

    #[test]
    fn test_verify_not_before() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111, "nbf": 2000}));
        let keyset = hmac_keyset(b"abcd1234");

        let early = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 1500));
        assert_eq!(early, Err(VerificationError::NotYetValid));

        let late = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2000));
        assert!(late.is_ok());
    }

    #[test]
    fn test_verify_non_numeric_time_claim() {
        let token = sign_hmac(json!({"iss": "flame", "iat": "yesterday"}));
        let keyset = hmac_keyset(b"abcd1234");

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2222));
        assert!(matches!(result, Err(VerificationError::Malformed(_))));
    }

    #[test]
    fn test_verify_unknown_kid() {
        let token = sign_hmac(json!({"iss": "flame", "iat": 1111}));
        let keyset = KeySet::new()
            .with_key(Key::hmac("other", Algorithm::HS256, b"abcd1234").expect("valid key"));

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2222));
        assert_eq!(result, Err(VerificationError::UnknownKey("key1".to_string())));
    }

    #[test]
    fn test_verify_without_kid_tries_matching_keys() {
        let header = Header::new(Algorithm::HS256);
        let token = encode(
            &header,
            &claims(json!({"iss": "flame", "iat": 1111})),
            &EncodingKey::from_secret(b"second-secret"),
        )
        .expect("failed to create test token");

        let keyset = KeySet::new()
            .with_key(Key::hmac("first", Algorithm::HS256, b"first-secret").expect("valid key"))
            .with_key(Key::hmac("big", Algorithm::HS512, b"second-secret").expect("valid key"))
            .with_key(Key::hmac("second", Algorithm::HS256, b"second-secret").expect("valid key"));

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2222));
        assert!(result.is_ok());
    }

    #[test]
    fn test_verify_without_kid_no_key_for_algorithm() {
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims(json!({"iss": "flame"})),
            &EncodingKey::from_secret(b"abcd1234"),
        )
        .expect("failed to create test token");
        let keyset = hmac_keyset(b"abcd1234");

        let result = JsonWebTokenCodec.verify(token.as_bytes(), &keyset, &expect_at("flame", 2222));
        assert_eq!(result, Err(VerificationError::NoMatchingKey(Algorithm::HS384)));
    }

    #[test]
    fn test_verify_malformed_token() {
        let keyset = hmac_keyset(b"abcd1234");

        for token in [&b"not-a-valid-jwt"[..], b"", b"\xff\xfe.\xfd"] {
            let result = JsonWebTokenCodec.verify(token, &keyset, &expect_at("flame", 2222));
            assert!(
                matches!(result, Err(VerificationError::Malformed(_))),
                "{token:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_verification_error_display() {
        assert_eq!(
            VerificationError::IssuerMismatch.to_string(),
            "\"iss\" not satisfied: values do not match"
        );
        assert_eq!(VerificationError::NotYetIssued.to_string(), "\"iat\" not satisfied");
        assert_eq!(VerificationError::Expired.to_string(), "\"exp\" not satisfied");
        assert_eq!(VerificationError::NotYetValid.to_string(), "\"nbf\" not satisfied");
        assert_eq!(
            VerificationError::UnknownKey("key9".to_string()).to_string(),
            "key \"key9\" is not in the keyset"
        );
    }

    #[test]
    fn test_sign_error_display() {
        assert_eq!(
            SignError::VerificationOnlyKey("ec1".to_string()).to_string(),
            "key 'ec1' cannot sign"
        );
        assert_eq!(
            SignError::Encoding("boom".to_string()).to_string(),
            "failed to sign token: boom"
        );
    }
}
