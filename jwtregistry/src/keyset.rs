//! Named signing and verification keys.
//!
//! A `KeySet` is an ordered collection of `Key`s, each identified by its key
//! id (`kid`). The algorithm is a property of the key: a token signed with a
//! key always uses that key's algorithm, and verification only accepts
//! tokens whose header names the same algorithm.
//!
//! # Invariants
//! - Every key has a non-empty `kid`.
//! - Every key can verify; only keys built with private material can sign.
//! - Key ids are unique within a set.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rand::Rng;

/// Length in bytes of generated HMAC secrets.
const GENERATED_SECRET_LENGTH: usize = 64;

/// Error returned when a key cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key id is empty or missing.
    MissingKeyId,
    /// The key has no usable signature algorithm.
    MissingAlgorithm(String),
    /// The HMAC secret is empty.
    EmptySecret(String),
    /// The algorithm cannot be used with this kind of key material.
    UnsupportedAlgorithm {
        /// The key id.
        kid: String,
        /// The rejected algorithm.
        algorithm: Algorithm,
    },
    /// The PEM-encoded key material could not be parsed.
    InvalidPem {
        /// The key id.
        kid: String,
        /// Description of the parse failure.
        reason: String,
    },
    /// A JWK could not be converted into a key.
    InvalidJwk {
        /// The key id.
        kid: String,
        /// Description of what is invalid.
        reason: String,
    },
    /// A JWK set document could not be parsed.
    InvalidJwkSet(String),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKeyId => write!(f, "key id must be provided"),
            Self::MissingAlgorithm(kid) => write!(f, "key '{kid}' has no signature algorithm"),
            Self::EmptySecret(kid) => write!(f, "secret for key '{kid}' must not be empty"),
            Self::UnsupportedAlgorithm { kid, algorithm } => {
                write!(f, "algorithm {algorithm:?} is not supported for key '{kid}'")
            }
            Self::InvalidPem { kid, reason } => write!(f, "invalid PEM for key '{kid}': {reason}"),
            Self::InvalidJwk { kid, reason } => write!(f, "invalid JWK '{kid}': {reason}"),
            Self::InvalidJwkSet(reason) => write!(f, "invalid JWK set: {reason}"),
        }
    }
}

impl std::error::Error for KeyError {}

/// The kind of key material an algorithm needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

const fn family(algorithm: Algorithm) -> KeyFamily {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
        Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
        Algorithm::EdDSA => KeyFamily::Ed,
        _ => KeyFamily::Rsa,
    }
}

/// Map a JWK `alg` value to a signature algorithm.
///
/// Key-management algorithms (`RSA1_5`, `RSA-OAEP`, ...) cannot sign JWTs.
const fn signature_algorithm(algorithm: &KeyAlgorithm) -> Option<Algorithm> {
    match algorithm {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// A named key usable for verification and, when private material is
/// present, for signing.
#[derive(Clone)]
pub struct Key {
    kid: String,
    algorithm: Algorithm,
    signing: Option<EncodingKey>,
    verifying: DecodingKey,
}

impl fmt::Debug for Key {
    // Key material is never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.can_sign())
            .finish_non_exhaustive()
    }
}

impl Key {
    /// Create a symmetric key from a shared secret.
    ///
    /// # Pre-conditions
    /// - `kid` and `secret` must not be empty.
    /// - `algorithm` must be one of HS256, HS384 or HS512.
    ///
    /// # Errors
    /// Returns `KeyError` if any pre-condition is violated.
    pub fn hmac(kid: impl Into<String>, algorithm: Algorithm, secret: &[u8]) -> Result<Self, KeyError> {
        let kid = non_empty_kid(kid.into())?;
        if family(algorithm) != KeyFamily::Hmac {
            return Err(KeyError::UnsupportedAlgorithm { kid, algorithm });
        }
        if secret.is_empty() {
            return Err(KeyError::EmptySecret(kid));
        }

        Ok(Self {
            kid,
            algorithm,
            signing: Some(EncodingKey::from_secret(secret)),
            verifying: DecodingKey::from_secret(secret),
        })
    }

    /// Create an HS256 key from a freshly generated random secret.
    ///
    /// # Errors
    /// Returns `KeyError::MissingKeyId` if `kid` is empty.
    pub fn generate_hmac(kid: impl Into<String>) -> Result<Self, KeyError> {
        let mut secret = [0u8; GENERATED_SECRET_LENGTH];
        rand::rng().fill(&mut secret[..]);
        Self::hmac(kid, Algorithm::HS256, &secret)
    }

    /// Create an asymmetric key pair from PEM-encoded material.
    ///
    /// RSA (`RS*`, `PS*`), EC (`ES256`, `ES384`) and Ed25519 (`EdDSA`) keys
    /// are supported. The private key must be PKCS#8 or, for RSA, PKCS#1.
    ///
    /// # Errors
    /// Returns `KeyError` if the algorithm is symmetric or either PEM is invalid.
    pub fn pem(
        kid: impl Into<String>,
        algorithm: Algorithm,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, KeyError> {
        let kid = non_empty_kid(kid.into())?;
        let key_family = family(algorithm);
        if key_family == KeyFamily::Hmac {
            return Err(KeyError::UnsupportedAlgorithm { kid, algorithm });
        }
        let invalid = |e: jsonwebtoken::errors::Error| KeyError::InvalidPem {
            kid: kid.clone(),
            reason: e.to_string(),
        };

        let signing = match key_family {
            KeyFamily::Ec => EncodingKey::from_ec_pem(private_pem),
            KeyFamily::Ed => EncodingKey::from_ed_pem(private_pem),
            KeyFamily::Hmac | KeyFamily::Rsa => EncodingKey::from_rsa_pem(private_pem),
        }
        .map_err(invalid)?;
        let verifying = decoding_key_from_pem(algorithm, public_pem).map_err(invalid)?;

        Ok(Self {
            kid,
            algorithm,
            signing: Some(signing),
            verifying,
        })
    }

    /// Create a verification-only key from a PEM-encoded public key.
    ///
    /// # Errors
    /// Returns `KeyError` if the algorithm is symmetric or the PEM is invalid.
    pub fn verifying_pem(
        kid: impl Into<String>,
        algorithm: Algorithm,
        public_pem: &[u8],
    ) -> Result<Self, KeyError> {
        let kid = non_empty_kid(kid.into())?;
        if family(algorithm) == KeyFamily::Hmac {
            return Err(KeyError::UnsupportedAlgorithm { kid, algorithm });
        }
        let verifying = decoding_key_from_pem(algorithm, public_pem).map_err(|e| KeyError::InvalidPem {
            kid: kid.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            kid,
            algorithm,
            signing: None,
            verifying,
        })
    }

    /// Create a key from a JSON Web Key.
    ///
    /// The JWK must carry a `kid` and a signature `alg`. Symmetric (`oct`)
    /// keys can sign as well as verify; public RSA, EC and OKP keys are
    /// verification-only.
    ///
    /// # Errors
    /// Returns `KeyError` if the JWK is incomplete or its material is invalid.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyError> {
        let kid = jwk
            .common
            .key_id
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or(KeyError::MissingKeyId)?;
        let algorithm = jwk
            .common
            .key_algorithm
            .as_ref()
            .and_then(signature_algorithm)
            .ok_or_else(|| KeyError::MissingAlgorithm(kid.clone()))?;

        if let AlgorithmParameters::OctetKey(params) = &jwk.algorithm {
            let secret = URL_SAFE_NO_PAD
                .decode(params.value.trim_end_matches('='))
                .map_err(|e| KeyError::InvalidJwk {
                    kid: kid.clone(),
                    reason: e.to_string(),
                })?;
            return Self::hmac(kid, algorithm, &secret);
        }

        if family(algorithm) == KeyFamily::Hmac {
            return Err(KeyError::InvalidJwk {
                kid,
                reason: "HMAC algorithms require an oct key".to_string(),
            });
        }
        let verifying = DecodingKey::from_jwk(jwk).map_err(|e| KeyError::InvalidJwk {
            kid: kid.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            kid,
            algorithm,
            signing: None,
            verifying,
        })
    }

    /// The key id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The algorithm tokens signed or verified with this key use.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether this key holds private material and can sign.
    #[must_use]
    pub const fn can_sign(&self) -> bool {
        self.signing.is_some()
    }

    /// The signing half, if present.
    #[must_use]
    pub const fn encoding_key(&self) -> Option<&EncodingKey> {
        self.signing.as_ref()
    }

    /// The verification half.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.verifying
    }
}

fn non_empty_kid(kid: String) -> Result<String, KeyError> {
    if kid.is_empty() {
        return Err(KeyError::MissingKeyId);
    }
    Ok(kid)
}

fn decoding_key_from_pem(
    algorithm: Algorithm,
    public_pem: &[u8],
) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
    match family(algorithm) {
        KeyFamily::Hmac | KeyFamily::Rsa => DecodingKey::from_rsa_pem(public_pem),
        KeyFamily::Ec => DecodingKey::from_ec_pem(public_pem),
        KeyFamily::Ed => DecodingKey::from_ed_pem(public_pem),
    }
}

/// An ordered collection of named keys.
///
/// Once handed to the registry a key set is shared, not copied, and must
/// not change; build it completely before registering.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<Key>,
}

impl KeySet {
    /// Create an empty key set.
    #[must_use]
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Add a key. A key with the same id is replaced in place.
    pub fn add(&mut self, key: Key) {
        match self.keys.iter_mut().find(|existing| existing.kid == key.kid) {
            Some(existing) => *existing = key,
            None => self.keys.push(key),
        }
    }

    /// Builder form of [`KeySet::add`].
    #[must_use]
    pub fn with_key(mut self, key: Key) -> Self {
        self.add(key);
        self
    }

    /// Look up a key by id.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over the keys in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }

    /// Convert every key of a JWK set.
    ///
    /// # Errors
    /// Returns the first `KeyError` encountered.
    pub fn from_jwk_set(jwks: &JwkSet) -> Result<Self, KeyError> {
        jwks.keys.iter().map(Key::from_jwk).collect()
    }

    /// Parse a JWK set JSON document (`{"keys": [...]}`).
    ///
    /// # Errors
    /// Returns `KeyError::InvalidJwkSet` if the document is not a JWK set,
    /// or the first `KeyError` of an individual key.
    pub fn from_jwks_json(json: &str) -> Result<Self, KeyError> {
        let jwks: JwkSet =
            serde_json::from_str(json).map_err(|e| KeyError::InvalidJwkSet(e.to_string()))?;
        Self::from_jwk_set(&jwks)
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.add(key);
        }
        set
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
