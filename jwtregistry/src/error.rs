//! Registry error type.
//!
//! Every failure is returned to the immediate caller; none are retried or
//! logged here. A failed operation never changes the registry.

use std::fmt;

use crate::codec::{SignError, VerificationError};

/// Broad classification of a `RegistryError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A registration argument was missing.
    InvalidArgument,
    /// No context is registered under the purpose.
    NotFound,
    /// The context cannot perform the requested operation.
    InvalidConfiguration,
    /// The token did not verify.
    VerificationFailure,
    /// The codec could not produce a token.
    SigningFailure,
    /// The registry itself is unusable.
    Internal,
}

/// Error returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `register` was called with an empty purpose.
    MissingPurpose,
    /// `register` was called with an empty issuer.
    MissingIssuer,
    /// No context is registered under the purpose.
    ContextNotFound,
    /// The context has no signing key name.
    SigningKeyNotSet,
    /// The context has no keys.
    EmptyKeyset,
    /// The signing key name does not match any key in the key set.
    KeyNotInKeyset,
    /// Token verification failed; the message is the codec's, unchanged.
    Verification(VerificationError),
    /// Token signing failed.
    Signing(SignError),
    /// A thread panicked while holding the registry lock.
    LockPoisoned,
}

impl RegistryError {
    /// The error's classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPurpose | Self::MissingIssuer => ErrorKind::InvalidArgument,
            Self::ContextNotFound => ErrorKind::NotFound,
            Self::SigningKeyNotSet | Self::EmptyKeyset | Self::KeyNotInKeyset => {
                ErrorKind::InvalidConfiguration
            }
            Self::Verification(_) => ErrorKind::VerificationFailure,
            Self::Signing(_) => ErrorKind::SigningFailure,
            Self::LockPoisoned => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPurpose => write!(f, "purpose must be provided"),
            Self::MissingIssuer => write!(f, "issuer must be provided"),
            Self::ContextNotFound => write!(f, "context not found in registry"),
            Self::SigningKeyNotSet => write!(f, "signing key not set"),
            Self::EmptyKeyset => write!(f, "keyset is empty"),
            Self::KeyNotInKeyset => write!(f, "key is not in the keyset"),
            Self::Verification(e) => write!(f, "{e}"),
            Self::Signing(e) => write!(f, "{e}"),
            Self::LockPoisoned => write!(f, "registry lock poisoned"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Verification(e) => Some(e),
            Self::Signing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VerificationError> for RegistryError {
    fn from(e: VerificationError) -> Self {
        Self::Verification(e)
    }
}

impl From<SignError> for RegistryError {
    fn from(e: SignError) -> Self {
        Self::Signing(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        assert_eq!(RegistryError::MissingPurpose.to_string(), "purpose must be provided");
        assert_eq!(RegistryError::MissingIssuer.to_string(), "issuer must be provided");
        assert_eq!(
            RegistryError::ContextNotFound.to_string(),
            "context not found in registry"
        );
        assert_eq!(RegistryError::SigningKeyNotSet.to_string(), "signing key not set");
        assert_eq!(RegistryError::EmptyKeyset.to_string(), "keyset is empty");
        assert_eq!(RegistryError::KeyNotInKeyset.to_string(), "key is not in the keyset");
        assert_eq!(RegistryError::LockPoisoned.to_string(), "registry lock poisoned");
    }

    #[test]
    fn test_verification_error_passes_through_verbatim() {
        let err = RegistryError::from(VerificationError::Expired);
        assert_eq!(err.to_string(), VerificationError::Expired.to_string());
        assert_eq!(err.kind(), ErrorKind::VerificationFailure);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RegistryError::MissingPurpose.kind(), ErrorKind::InvalidArgument);
        assert_eq!(RegistryError::MissingIssuer.kind(), ErrorKind::InvalidArgument);
        assert_eq!(RegistryError::ContextNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            RegistryError::SigningKeyNotSet.kind(),
            ErrorKind::InvalidConfiguration
        );
        assert_eq!(RegistryError::EmptyKeyset.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(
            RegistryError::KeyNotInKeyset.kind(),
            ErrorKind::InvalidConfiguration
        );
        assert_eq!(
            RegistryError::Signing(SignError::Encoding("x".to_string())).kind(),
            ErrorKind::SigningFailure
        );
        assert_eq!(RegistryError::LockPoisoned.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_source() {
        use std::error::Error;

        assert!(RegistryError::from(VerificationError::NotYetIssued).source().is_some());
        assert!(RegistryError::EmptyKeyset.source().is_none());
    }
}
