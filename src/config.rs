//! Service configuration derived from environment variables.
//!
//! Configuration is loaded once at startup and validated before the service starts.
//!
//! ## Environment Variables
//!
//! - `CEREMONY_HOST`: Bind address (default: :: for dual-stack IPv4/IPv6)
//! - `CEREMONY_PORT`: HTTP port (default: 5002)
//! - `CEREMONY_DB_PATH`: Path to ReDB ledger file (unset: in-memory ledger)
//! - `CEREMONY_CIPHERSUITE`: "secp256k1" (default) or "ed25519"
//! - `CEREMONY_AUTH_TOKEN`: Shared token checked against each request's auth header
//! - `CEREMONY_BODY_LIMIT_KB`: JSON body limit (default: 256)
//! - `INTERNAL_SERVICE_TOKEN`: Bearer token for the HTTP surface
//! - `INTERNAL_SERVICE_TOKEN_REQUIRED`: Force the bearer token outside production
//! - `RATE_LIMIT_CEREMONY_PER_HOUR`, `RATE_LIMIT_CEREMONY_BURST`: per-IP limits
//! - `RUST_LOG`: Log level filter

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 5002;
const DEFAULT_BODY_LIMIT_KB: usize = 256;
const DEFAULT_CEREMONIES_PER_HOUR: u32 = 600;
const DEFAULT_CEREMONY_BURST: u32 = 20;

/// Helper to get trimmed env var or empty string.
fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

/// Helper to get lowercase env var.
fn env_lower(name: &str) -> String {
    env_trim(name).to_lowercase()
}

/// Trimmed env var, `None` when unset or blank.
fn env_opt(name: &str) -> Option<String> {
    let value = env_trim(name);
    if value.is_empty() { None } else { Some(value) }
}

/// Check if a string value is truthy.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes")
}

/// FROST ciphersuite selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ciphersuite {
    /// secp256k1 curve (Bitcoin, Ethereum compatible).
    #[default]
    Secp256k1,
    /// ed25519 curve (general purpose).
    Ed25519,
}

impl FromStr for Ciphersuite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "secp256k1" => Ok(Self::Secp256k1),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(format!(
                "Invalid ciphersuite '{other}'. Must be 'secp256k1' or 'ed25519'."
            )),
        }
    }
}

impl std::fmt::Display for Ciphersuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secp256k1 => write!(f, "secp256k1"),
            Self::Ed25519 => write!(f, "ed25519"),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    port: u16,
    host: IpAddr,
    db_path: Option<PathBuf>,
    ciphersuite: Ciphersuite,
    ciphersuite_error: Option<String>,
    auth_token: Option<String>,
    internal_token: Option<String>,
    internal_token_required: bool,
    body_limit_bytes: usize,
    ceremonies_per_hour: u32,
    ceremony_burst: u32,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Never panics; call [`Settings::validate`] before serving.
    pub fn from_env() -> Self {
        let port = env_trim("CEREMONY_PORT")
            .parse::<u16>()
            .unwrap_or(DEFAULT_PORT);

        // Default to IPv6 unspecified (::) for dual-stack support.
        let host = env_trim("CEREMONY_HOST")
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let db_path = env_opt("CEREMONY_DB_PATH").map(PathBuf::from);

        let (ciphersuite, ciphersuite_error) = match env_opt("CEREMONY_CIPHERSUITE") {
            None => (Ciphersuite::default(), None),
            Some(raw) => match raw.parse::<Ciphersuite>() {
                Ok(suite) => (suite, None),
                Err(e) => (Ciphersuite::default(), Some(e)),
            },
        };

        let auth_token = env_opt("CEREMONY_AUTH_TOKEN");
        let internal_token = env_opt("INTERNAL_SERVICE_TOKEN");

        // Determine if token is required based on environment
        let is_production = ["NODE_ENV", "APP_ENV", "RUST_ENV"]
            .iter()
            .any(|name| env_lower(name) == "production");
        let internal_token_required =
            is_production || is_truthy(&env_lower("INTERNAL_SERVICE_TOKEN_REQUIRED"));

        let body_limit_kb = env_trim("CEREMONY_BODY_LIMIT_KB")
            .parse::<usize>()
            .unwrap_or(DEFAULT_BODY_LIMIT_KB);

        let ceremonies_per_hour = env_trim("RATE_LIMIT_CEREMONY_PER_HOUR")
            .parse::<u32>()
            .unwrap_or(DEFAULT_CEREMONIES_PER_HOUR);
        let ceremony_burst = env_trim("RATE_LIMIT_CEREMONY_BURST")
            .parse::<u32>()
            .unwrap_or(DEFAULT_CEREMONY_BURST);

        Self {
            port,
            host,
            db_path,
            ciphersuite,
            ciphersuite_error,
            auth_token,
            internal_token,
            internal_token_required,
            body_limit_bytes: body_limit_kb.saturating_mul(1024),
            ceremonies_per_hour,
            ceremony_burst,
        }
    }

    /// Deterministic settings for tests: in-memory ledger, no tokens.
    pub fn for_tests() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            db_path: None,
            ciphersuite: Ciphersuite::Secp256k1,
            ciphersuite_error: None,
            auth_token: None,
            internal_token: None,
            internal_token_required: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT_KB * 1024,
            ceremonies_per_hour: DEFAULT_CEREMONIES_PER_HOUR,
            ceremony_burst: DEFAULT_CEREMONY_BURST,
        }
    }

    /// Validate settings.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(err) = &self.ciphersuite_error {
            return Err(format!("CEREMONY_CIPHERSUITE configuration error: {err}"));
        }

        if self.internal_token_required && self.internal_token.is_none() {
            return Err("INTERNAL_SERVICE_TOKEN is required in production. \
                 Set INTERNAL_SERVICE_TOKEN or INTERNAL_SERVICE_TOKEN_REQUIRED=0."
                .to_string());
        }

        if self.body_limit_bytes == 0 {
            return Err("CEREMONY_BODY_LIMIT_KB must be greater than zero.".to_string());
        }

        if self.ceremonies_per_hour == 0 || self.ceremony_burst == 0 {
            return Err("RATE_LIMIT_CEREMONY_PER_HOUR and RATE_LIMIT_CEREMONY_BURST \
                 must be greater than zero."
                .to_string());
        }

        Ok(())
    }

    // Builders used by tests and embedders

    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ciphersuite(mut self, ciphersuite: Ciphersuite) -> Self {
        self.ciphersuite = ciphersuite;
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_internal_token(mut self, token: impl Into<String>) -> Self {
        self.internal_token = Some(token.into());
        self.internal_token_required = true;
        self
    }

    // Getters

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn internal_token(&self) -> Option<&str> {
        self.internal_token.as_deref()
    }

    pub fn internal_token_required(&self) -> bool {
        self.internal_token_required
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }

    pub fn ceremonies_per_hour(&self) -> u32 {
        self.ceremonies_per_hour
    }

    pub fn ceremony_burst(&self) -> u32 {
        self.ceremony_burst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ciphersuite_parsing() {
        assert_eq!(
            "secp256k1".parse::<Ciphersuite>().unwrap(),
            Ciphersuite::Secp256k1
        );
        assert_eq!(
            "ED25519".parse::<Ciphersuite>().unwrap(),
            Ciphersuite::Ed25519
        );
        assert!("invalid".parse::<Ciphersuite>().is_err());
    }

    #[test]
    fn test_ciphersuite_serde_lowercase() {
        let json = serde_json::to_string(&Ciphersuite::Ed25519).unwrap();
        assert_eq!(json, "\"ed25519\"");
    }

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::for_tests();
        assert!(settings.validate().is_ok());
        assert!(settings.db_path().is_none());
        assert_eq!(settings.body_limit_bytes(), 256 * 1024);
    }

    #[test]
    fn test_required_token_missing() {
        let mut settings = Settings::for_tests();
        settings.internal_token_required = true;
        let err = settings.validate().unwrap_err();
        assert!(err.contains("INTERNAL_SERVICE_TOKEN"));

        let settings = Settings::for_tests().with_internal_token("secret");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_bad_ciphersuite_reported() {
        let mut settings = Settings::for_tests();
        settings.ciphersuite_error = Some("Invalid ciphersuite 'p256'".to_string());
        assert!(settings.validate().unwrap_err().contains("CEREMONY_CIPHERSUITE"));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut settings = Settings::for_tests();
        settings.ceremony_burst = 0;
        assert!(settings.validate().is_err());
    }
}
