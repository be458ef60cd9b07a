//! Per-purpose signing and validation configuration.
//!
//! # Pre-conditions
//! - `purpose` and `issuer` must be non-empty strings.
//! - A key set must be fully built before it is handed to `ContextOptions`.
//!
//! # Post-conditions
//! - `Context` instances are immutable once created.
//!
//! # Invariants
//! - `purpose` and `issuer` are never empty.
//! - Every context has a clock; it defaults to `SystemClock`.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::RegistryError;
use crate::keyset::KeySet;

/// Optional settings applied when a context is registered.
///
/// Each field is independent; unset fields keep their defaults (no key set,
/// no signing key, no expiry, system clock).
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Keys used to verify tokens, and to select the signing key from.
    pub keyset: Option<Arc<KeySet>>,
    /// Key id used when signing. Empty means the context cannot sign.
    pub signing_key_name: String,
    /// Time between `iat` and `exp` of signed tokens. Zero omits `exp`.
    pub signing_validity_period: Duration,
    /// Clock override, mostly for deterministic tests.
    pub clock: Option<Arc<dyn Clock>>,
}

impl ContextOptions {
    /// Options with every field at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key set. The set is shared, not copied.
    #[must_use]
    pub fn with_keyset(mut self, keyset: impl Into<Arc<KeySet>>) -> Self {
        self.keyset = Some(keyset.into());
        self
    }

    /// Select the key used for signing by its id.
    #[must_use]
    pub fn with_signing_key_name(mut self, name: impl Into<String>) -> Self {
        self.signing_key_name = name.into();
        self
    }

    /// Set the validity period of signed tokens.
    ///
    /// Tokens that already carry `exp` are checked against it on validation
    /// regardless of this setting.
    #[must_use]
    pub fn with_signing_validity_period(mut self, period: Duration) -> Self {
        self.signing_validity_period = period;
        self
    }

    /// Replace the context's clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

/// A named signer and validator for one purpose.
///
/// To change a purpose's configuration, register a new `Context` under the
/// same purpose; the old one is replaced as a whole.
#[derive(Debug, Clone)]
pub struct Context {
    purpose: String,
    issuer: String,
    keyset: Option<Arc<KeySet>>,
    signing_key_name: String,
    signing_validity_period: Duration,
    clock: Arc<dyn Clock>,
}

impl Context {
    /// Validate the arguments and build a context.
    ///
    /// # Errors
    /// Returns `RegistryError::MissingPurpose` if `purpose` is empty, then
    /// `RegistryError::MissingIssuer` if `issuer` is empty.
    pub fn new(
        purpose: impl Into<String>,
        issuer: impl Into<String>,
        options: ContextOptions,
    ) -> Result<Self, RegistryError> {
        let purpose = purpose.into();
        if purpose.is_empty() {
            return Err(RegistryError::MissingPurpose);
        }
        let issuer = issuer.into();
        if issuer.is_empty() {
            return Err(RegistryError::MissingIssuer);
        }

        let ContextOptions {
            keyset,
            signing_key_name,
            signing_validity_period,
            clock,
        } = options;

        Ok(Self {
            purpose,
            issuer,
            keyset,
            signing_key_name,
            signing_validity_period,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }

    /// The registry key.
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Value written to, and required in, the `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The key set, if one was configured.
    #[must_use]
    pub fn keyset(&self) -> Option<&Arc<KeySet>> {
        self.keyset.as_ref()
    }

    /// The key set if it has at least one key.
    #[must_use]
    pub fn non_empty_keyset(&self) -> Option<&KeySet> {
        self.keyset.as_deref().filter(|keyset| !keyset.is_empty())
    }

    /// Key id used for signing; empty if signing is unsupported.
    #[must_use]
    pub fn signing_key_name(&self) -> &str {
        &self.signing_key_name
    }

    /// Validity period of signed tokens; zero means no `exp`.
    #[must_use]
    pub const fn signing_validity_period(&self) -> Duration {
        self.signing_validity_period
    }

    /// The context's clock.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
