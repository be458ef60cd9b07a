//! Registry of signing and validation contexts, keyed by purpose.
//!
//! Callers register a `Context` once under a short purpose name and then
//! sign or validate tokens by naming only the purpose.
//!
//! # Pre-conditions
//! - Purposes and issuers passed to `register` must be non-empty.
//! - Key sets handed to the registry must not change afterwards.
//!
//! # Post-conditions
//! - A successful `register` replaces any previous context for the purpose.
//! - A failed operation leaves the registry unchanged.
//!
//! # Invariants
//! - Contexts in the map are immutable and never partially constructed.
//! - The lock is held only for map operations, never while signing or verifying.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::SystemTime;

use serde_json::Value;

use crate::clock::{Clock, unix_seconds};
use crate::codec::{Claims, Expectations, JsonWebTokenCodec, TokenCodec};
use crate::context::{Context, ContextOptions};
use crate::error::RegistryError;

/// Claim carrying the issuer.
pub const ISSUER_CLAIM: &str = "iss";
/// Claim carrying the issue time.
pub const ISSUED_AT_CLAIM: &str = "iat";
/// Claim carrying the expiry time.
pub const EXPIRATION_CLAIM: &str = "exp";

/// Claims registered by RFC 7519; everything else is a private claim.
const REGISTERED_CLAIMS: [&str; 7] = [
    ISSUER_CLAIM,
    "sub",
    "aud",
    EXPIRATION_CLAIM,
    "nbf",
    ISSUED_AT_CLAIM,
    "jti",
];

/// A thread-safe map from purpose to `Context`.
///
/// # Thread Safety
///
/// The map is guarded by a single `RwLock`. Lookups clone the context's
/// `Arc` and release the lock before any cryptographic work, so a slow
/// signature never blocks registration and a replaced context stays
/// consistent for operations already holding it.
pub struct Registry {
    /// Map from purpose to its current context.
    contexts: RwLock<HashMap<String, Arc<Context>>>,
    /// Signing and verification backend.
    codec: Arc<dyn TokenCodec>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("purposes", &self.purposes())
            .field("codec", &self.codec)
            .finish()
    }
}

impl Registry {
    /// Create an empty registry using `JsonWebTokenCodec`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(Arc::new(JsonWebTokenCodec))
    }

    /// Create an empty registry that delegates to `codec`.
    #[must_use]
    pub fn with_codec(codec: Arc<dyn TokenCodec>) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            codec,
        }
    }

    /// Build a context and store it under `purpose`, replacing any previous one.
    ///
    /// # Errors
    /// Returns `RegistryError::MissingPurpose` or `RegistryError::MissingIssuer`
    /// for empty arguments; nothing is stored in that case.
    /// Returns `RegistryError::LockPoisoned` if the lock is poisoned.
    pub fn register(
        &self,
        purpose: impl Into<String>,
        issuer: impl Into<String>,
        options: ContextOptions,
    ) -> Result<(), RegistryError> {
        let context = Context::new(purpose, issuer, options)?;
        let purpose = context.purpose().to_string();

        let replaced = {
            let mut contexts = self
                .contexts
                .write()
                .map_err(|_| RegistryError::LockPoisoned)?;
            contexts.insert(purpose.clone(), Arc::new(context)).is_some()
        };

        if replaced {
            tracing::debug!("Replaced JWT context for purpose '{}'", purpose);
        } else {
            tracing::debug!("Registered JWT context for purpose '{}'", purpose);
        }
        Ok(())
    }

    /// The current context for `purpose`, if any.
    ///
    /// Contexts are immutable, so the map stays consistent even if a thread
    /// panicked while holding the lock; a poisoned lock is read through.
    #[must_use]
    pub fn lookup(&self, purpose: &str) -> Option<Arc<Context>> {
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        contexts.get(purpose).cloned()
    }

    /// Remove the context for `purpose`. Absent purposes are ignored.
    pub fn delete(&self, purpose: &str) {
        let removed = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(purpose)
            .is_some();
        if removed {
            tracing::debug!("Deleted JWT context for purpose '{}'", purpose);
        }
    }

    /// Remove every context.
    pub fn clear(&self) {
        let removed = {
            let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
            let removed = contexts.len();
            contexts.clear();
            removed
        };
        tracing::debug!("Cleared JWT context registry ({} purposes removed)", removed);
    }

    /// Number of registered purposes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no purpose is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered purposes, sorted.
    #[must_use]
    pub fn purposes(&self) -> Vec<String> {
        let mut purposes: Vec<String> = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        purposes.sort_unstable();
        purposes
    }

    /// Sign a new token for `purpose`.
    ///
    /// The token carries `iss` (the context's issuer), `iat` (now) and, when
    /// the context has a validity period, `exp` (now plus the period). Every
    /// entry of `extra_claims` is added afterwards as a string claim and
    /// overwrites a standard claim of the same name.
    ///
    /// "Now" comes from `clock` if given, otherwise from the context's clock.
    ///
    /// # Errors
    /// Returns `RegistryError::ContextNotFound` if `purpose` is not registered,
    /// `SigningKeyNotSet`, `EmptyKeyset` or `KeyNotInKeyset` if the context
    /// cannot sign, and `Signing` if the codec fails.
    pub fn sign(
        &self,
        purpose: &str,
        extra_claims: &HashMap<String, String>,
        clock: Option<&dyn Clock>,
    ) -> Result<String, RegistryError> {
        let context = self.find(purpose)?;

        if context.signing_key_name().is_empty() {
            return Err(RegistryError::SigningKeyNotSet);
        }
        let keyset = context
            .non_empty_keyset()
            .ok_or(RegistryError::EmptyKeyset)?;
        let key = keyset
            .find(context.signing_key_name())
            .ok_or(RegistryError::KeyNotInKeyset)?;

        let now = clock.map_or_else(|| context.clock().now(), |clock| clock.now());
        let issued_at = unix_seconds(now);

        let mut claims = Claims::new();
        claims.insert(ISSUER_CLAIM.to_string(), Value::from(context.issuer()));
        claims.insert(ISSUED_AT_CLAIM.to_string(), Value::from(issued_at));
        let period = context.signing_validity_period();
        if !period.is_zero() {
            let expires_at = now.checked_add(period).map_or(i64::MAX, unix_seconds);
            claims.insert(EXPIRATION_CLAIM.to_string(), Value::from(expires_at));
        }
        for (name, value) in extra_claims {
            claims.insert(name.clone(), Value::from(value.as_str()));
        }

        let token = self.codec.sign(&claims, key)?;
        tracing::trace!(
            "Signed token for purpose '{}' with key '{}'",
            purpose,
            key.kid()
        );
        Ok(token)
    }

    /// Validate `token` for `purpose` and return its private claims.
    ///
    /// The signature, issuer and time claims are checked by the codec. Time
    /// checks use `clock` if given, otherwise wall-clock time; the context's
    /// clock only drives signing. The returned map holds every claim not
    /// registered by RFC 7519, with string values as-is and other values as
    /// JSON text.
    ///
    /// # Errors
    /// Returns `RegistryError::ContextNotFound` if `purpose` is not registered,
    /// `EmptyKeyset` if the context has no keys, and `Verification` with the
    /// codec's error otherwise.
    pub fn validate(
        &self,
        purpose: &str,
        token: impl AsRef<[u8]>,
        clock: Option<&dyn Clock>,
    ) -> Result<HashMap<String, String>, RegistryError> {
        let context = self.find(purpose)?;
        let keyset = context
            .non_empty_keyset()
            .ok_or(RegistryError::EmptyKeyset)?;

        let expected = Expectations {
            issuer: context.issuer(),
            now: clock.map_or_else(SystemTime::now, |clock| clock.now()),
        };
        let claims = self
            .codec
            .verify(token.as_ref(), keyset, &expected)
            .inspect_err(|e| {
                tracing::debug!("Token for purpose '{}' failed validation: {e}", purpose);
            })?;

        Ok(private_claims(claims))
    }

    /// Look up `purpose`, holding the read lock only for the map access.
    fn find(&self, purpose: &str) -> Result<Arc<Context>, RegistryError> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        contexts
            .get(purpose)
            .cloned()
            .ok_or(RegistryError::ContextNotFound)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep only private claims, rendered as strings.
fn private_claims(claims: Claims) -> HashMap<String, String> {
    claims
        .into_iter()
        .filter(|(name, _)| !REGISTERED_CLAIMS.contains(&name.as_str()))
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}

/// The process-wide registry.
static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, created on first use.
///
/// Safe to call concurrently; the registry is constructed exactly once.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::new)
}

/// [`Registry::register`] on the process-wide registry.
///
/// # Errors
/// See [`Registry::register`].
pub fn register(
    purpose: impl Into<String>,
    issuer: impl Into<String>,
    options: ContextOptions,
) -> Result<(), RegistryError> {
    global().register(purpose, issuer, options)
}

/// [`Registry::lookup`] on the process-wide registry.
#[must_use]
pub fn lookup(purpose: &str) -> Option<Arc<Context>> {
    global().lookup(purpose)
}

/// [`Registry::delete`] on the process-wide registry.
pub fn delete(purpose: &str) {
    global().delete(purpose);
}

/// [`Registry::clear`] on the process-wide registry.
pub fn clear() {
    global().clear();
}

/// [`Registry::sign`] on the process-wide registry.
///
/// # Errors
/// See [`Registry::sign`].
pub fn sign(
    purpose: &str,
    extra_claims: &HashMap<String, String>,
    clock: Option<&dyn Clock>,
) -> Result<String, RegistryError> {
    global().sign(purpose, extra_claims, clock)
}

/// [`Registry::validate`] on the process-wide registry.
///
/// # Errors
/// See [`Registry::validate`].
pub fn validate(
    purpose: &str,
    token: impl AsRef<[u8]>,
    clock: Option<&dyn Clock>,
) -> Result<HashMap<String, String>, RegistryError> {
    global().validate(purpose, token, clock)
}
