#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from bad input.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::collections::HashMap;

use jwtregistry::{RegistryConfig, registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: jwtregistry sign [name=value ...] | jwtregistry validate <token>";

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jwtregistry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load the registration from environment variables
    let config = match RegistryConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.register_into(registry::global()) {
        tracing::error!("Failed to register purpose '{}': {e}", config.purpose);
        std::process::exit(1);
    }
    tracing::info!(
        "Registered purpose '{}' for issuer '{}'",
        config.purpose,
        config.issuer
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.split_first() {
        Some((command, rest)) if command == "sign" => sign(&config.purpose, rest),
        Some((command, [token])) if command == "validate" => validate(&config.purpose, token),
        _ => Err(USAGE.to_string()),
    };

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Sign a token carrying `name=value` claims.
fn sign(purpose: &str, args: &[String]) -> Result<String, String> {
    let mut claims = HashMap::new();
    for arg in args {
        let Some((name, value)) = arg.split_once('=') else {
            return Err(format!("claim '{arg}' is not of the form name=value"));
        };
        claims.insert(name.to_string(), value.to_string());
    }

    registry::sign(purpose, &claims, None).map_err(|e| format!("Failed to sign: {e}"))
}

/// Validate a token and render its private claims as JSON.
fn validate(purpose: &str, token: &str) -> Result<String, String> {
    let claims = registry::validate(purpose, token, None)
        .map_err(|e| format!("Failed to validate: {e}"))?;
    serde_json::to_string(&claims).map_err(|e| format!("Failed to render claims: {e}"))
}
