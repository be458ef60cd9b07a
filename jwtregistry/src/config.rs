//! Registration configuration module.
//!
//! Loads one purpose's registration from environment variables.
//!
//! # Environment Variables
//!
//! - `JWTREGISTRY_PURPOSE`: Purpose to register under (default: `default`)
//! - `JWTREGISTRY_ISSUER`: Issuer placed in and required of the `iss` claim (required)
//! - `JWTREGISTRY_KEYSET_FILE`: Path to a JWK set JSON document (optional)
//! - `JWTREGISTRY_SIGNING_KEY_NAME`: Key id used for signing (optional)
//! - `JWTREGISTRY_SIGNING_VALIDITY_SECONDS`: Seconds between `iat` and `exp` (default: `0`, no expiry)
//!
//! # Invariants
//!
//! - `purpose` and `issuer` are never empty
//! - `signing_validity_period` is a whole number of seconds

use std::path::PathBuf;
use std::time::Duration;

use crate::context::ContextOptions;
use crate::error::RegistryError;
use crate::keyset::{KeyError, KeySet};
use crate::registry::Registry;

const PURPOSE_VAR: &str = "JWTREGISTRY_PURPOSE";
const ISSUER_VAR: &str = "JWTREGISTRY_ISSUER";
const KEYSET_FILE_VAR: &str = "JWTREGISTRY_KEYSET_FILE";
const SIGNING_KEY_NAME_VAR: &str = "JWTREGISTRY_SIGNING_KEY_NAME";
const SIGNING_VALIDITY_SECONDS_VAR: &str = "JWTREGISTRY_SIGNING_VALIDITY_SECONDS";

/// One purpose's registration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Purpose to register under.
    pub purpose: String,
    /// Issuer for the purpose.
    pub issuer: String,
    /// JWK set document to load keys from.
    pub keyset_file: Option<PathBuf>,
    /// Key id used for signing; empty disables signing.
    pub signing_key_name: String,
    /// Validity period of signed tokens.
    pub signing_validity_period: Duration,
}

/// Error returned when loading or applying configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
    /// The key set file could not be read.
    KeysetFile { path: PathBuf, message: String },
    /// The key set file does not hold a usable JWK set.
    Keyset(KeyError),
    /// Registration was rejected.
    Registry(RegistryError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
            Self::KeysetFile { path, message } => {
                write!(f, "cannot read keyset file {}: {message}", path.display())
            }
            Self::Keyset(e) => write!(f, "invalid keyset: {e}"),
            Self::Registry(e) => write!(f, "registration failed: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Keyset(e) => Some(e),
            Self::Registry(e) => Some(e),
            Self::MissingEnvVar(_) | Self::InvalidValue { .. } | Self::KeysetFile { .. } => None,
        }
    }
}

impl From<KeyError> for ConfigError {
    fn from(e: KeyError) -> Self {
        Self::Keyset(e)
    }
}

impl From<RegistryError> for ConfigError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl RegistryConfig {
    /// Default purpose when `JWTREGISTRY_PURPOSE` is not set.
    pub const DEFAULT_PURPOSE: &'static str = "default";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWTREGISTRY_ISSUER` is not set or is empty
    /// - `JWTREGISTRY_PURPOSE` is set but empty
    /// - `JWTREGISTRY_SIGNING_VALIDITY_SECONDS` is set but not a whole number
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RegistryConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let purpose = match lookup(PURPOSE_VAR) {
            Some(purpose) => non_empty(PURPOSE_VAR, purpose)?,
            None => Self::DEFAULT_PURPOSE.to_string(),
        };
        let issuer = lookup(ISSUER_VAR).ok_or_else(|| ConfigError::MissingEnvVar(ISSUER_VAR.to_string()))?;
        let issuer = non_empty(ISSUER_VAR, issuer)?;
        let keyset_file = lookup(KEYSET_FILE_VAR)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        let signing_key_name = lookup(SIGNING_KEY_NAME_VAR).unwrap_or_default();
        let signing_validity_period = Self::parse_validity(lookup(SIGNING_VALIDITY_SECONDS_VAR))?;

        Ok(Self {
            purpose,
            issuer,
            keyset_file,
            signing_key_name,
            signing_validity_period,
        })
    }

    /// Parse the validity period.
    ///
    /// Returns zero if not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is set but not a whole number of seconds.
    fn parse_validity(value: Option<String>) -> Result<Duration, ConfigError> {
        match value {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    name: SIGNING_VALIDITY_SECONDS_VAR.to_string(),
                    message: format!("'{value}' is not a whole number of seconds"),
                }),
            None => Ok(Duration::ZERO),
        }
    }

    /// Read and parse the key set file, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid JWK set.
    pub fn load_keyset(&self) -> Result<Option<KeySet>, ConfigError> {
        let Some(path) = &self.keyset_file else {
            return Ok(None);
        };
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::KeysetFile {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(KeySet::from_jwks_json(&json)?))
    }

    /// Build the context options this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be loaded.
    pub fn context_options(&self) -> Result<ContextOptions, ConfigError> {
        let mut options = ContextOptions::new()
            .with_signing_key_name(self.signing_key_name.clone())
            .with_signing_validity_period(self.signing_validity_period);
        if let Some(keyset) = self.load_keyset()? {
            tracing::debug!(
                "Loaded {} key(s) for purpose '{}'",
                keyset.len(),
                self.purpose
            );
            options = options.with_keyset(keyset);
        }
        Ok(options)
    }

    /// Register this configuration's purpose in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be loaded or registration fails.
    pub fn register_into(&self, registry: &Registry) -> Result<(), ConfigError> {
        let options = self.context_options()?;
        registry.register(self.purpose.clone(), self.issuer.clone(), options)?;
        Ok(())
    }
}

fn non_empty(name: &str, value: String) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::clock::FixedClock;

    const JWKS: &str = r#"{"keys":[{"kty":"oct","kid":"key1","alg":"HS256","k":"YWJjZDEyMzQ"}]}"#;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn jwks_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write JWKS");
        file
    }

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::from_lookup(lookup_from(&[(ISSUER_VAR, "flame")]))
            .expect("valid config");

        assert_eq!(config.purpose, RegistryConfig::DEFAULT_PURPOSE);
        assert_eq!(config.issuer, "flame");
        assert!(config.keyset_file.is_none());
        assert_eq!(config.signing_key_name, "");
        assert_eq!(config.signing_validity_period, Duration::ZERO);
    }

    #[test]
    fn test_all_values() {
        let config = RegistryConfig::from_lookup(lookup_from(&[
            (PURPOSE_VAR, "expiry"),
            (ISSUER_VAR, "flame"),
            (KEYSET_FILE_VAR, "/etc/jwks.json"),
            (SIGNING_KEY_NAME_VAR, "key1"),
            (SIGNING_VALIDITY_SECONDS_VAR, "60"),
        ]))
        .expect("valid config");

        assert_eq!(
            config,
            RegistryConfig {
                purpose: "expiry".to_string(),
                issuer: "flame".to_string(),
                keyset_file: Some(PathBuf::from("/etc/jwks.json")),
                signing_key_name: "key1".to_string(),
                signing_validity_period: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn test_missing_issuer() {
        let result = RegistryConfig::from_lookup(lookup_from(&[]));
        assert_eq!(
            result,
            Err(ConfigError::MissingEnvVar(ISSUER_VAR.to_string()))
        );
    }

    #[test]
    fn test_empty_issuer() {
        let result = RegistryConfig::from_lookup(lookup_from(&[(ISSUER_VAR, "")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == ISSUER_VAR));
    }

    #[test]
    fn test_empty_purpose() {
        let result =
            RegistryConfig::from_lookup(lookup_from(&[(PURPOSE_VAR, ""), (ISSUER_VAR, "flame")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == PURPOSE_VAR));
    }

    #[test]
    fn test_invalid_validity() {
        let result = RegistryConfig::from_lookup(lookup_from(&[
            (ISSUER_VAR, "flame"),
            (SIGNING_VALIDITY_SECONDS_VAR, "one minute"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name, .. }) if name == SIGNING_VALIDITY_SECONDS_VAR
        ));
    }

    #[test]
    fn test_register_into_with_keyset_file() {
        let file = jwks_file(JWKS);
        let config = RegistryConfig::from_lookup(lookup_from(&[
            (PURPOSE_VAR, "noExpiry"),
            (ISSUER_VAR, "flame"),
            (KEYSET_FILE_VAR, file.path().to_str().expect("utf-8 path")),
            (SIGNING_KEY_NAME_VAR, "key1"),
        ]))
        .expect("valid config");

        let registry = Registry::new();
        config.register_into(&registry).expect("registered");

        let token = registry
            .sign("noExpiry", &HashMap::new(), Some(&FixedClock::new(1111)))
            .expect("signed");
        let claims = registry
            .validate("noExpiry", &token, Some(&FixedClock::new(2222)))
            .expect("validated");
        assert!(claims.is_empty());
    }

    #[test]
    fn test_register_into_without_keyset_file() {
        let config = RegistryConfig::from_lookup(lookup_from(&[(ISSUER_VAR, "flame")]))
            .expect("valid config");
        let registry = Registry::new();
        config.register_into(&registry).expect("registered");

        let context = registry
            .lookup(RegistryConfig::DEFAULT_PURPOSE)
            .expect("context present");
        assert!(context.keyset().is_none());
    }

    #[test]
    fn test_missing_keyset_file() {
        let config = RegistryConfig {
            purpose: "p".to_string(),
            issuer: "flame".to_string(),
            keyset_file: Some(PathBuf::from("/nonexistent/jwks.json")),
            signing_key_name: String::new(),
            signing_validity_period: Duration::ZERO,
        };
        let result = config.register_into(&Registry::new());
        assert!(matches!(result, Err(ConfigError::KeysetFile { .. })));
    }

    #[test]
    fn test_invalid_keyset_file() {
        let file = jwks_file("not json");
        let config = RegistryConfig {
            purpose: "p".to_string(),
            issuer: "flame".to_string(),
            keyset_file: Some(file.path().to_path_buf()),
            signing_key_name: String::new(),
            signing_validity_period: Duration::ZERO,
        };
        let result = config.load_keyset();
        assert!(matches!(result, Err(ConfigError::Keyset(KeyError::InvalidJwkSet(_)))));
    }

    #[test]
    fn test_config_error_display_missing() {
        let error = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert_eq!(
            error.to_string(),
            "missing required environment variable: TEST_VAR"
        );
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }

    #[test]
    fn test_config_error_display_registry() {
        let error = ConfigError::from(RegistryError::MissingIssuer);
        assert_eq!(
            error.to_string(),
            "registration failed: issuer must be provided"
        );
    }
}
