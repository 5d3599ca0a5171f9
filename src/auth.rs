//! Caller authentication for ceremony requests.
//!
//! The coordinator threads the caller's auth header through as an opaque
//! token and asks an [`Authenticator`] to accept or reject it before any
//! other check runs.

use std::fmt;

use crate::config::Settings;
use crate::error::CeremonyError;

/// Opaque auth token supplied by the caller.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHeader(String);

impl AuthHeader {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token with any `Bearer ` prefix and surrounding whitespace removed.
    pub fn token(&self) -> &str {
        let trimmed = self.0.trim();
        trimmed.strip_prefix("Bearer ").unwrap_or(trimmed).trim()
    }
}

impl From<&str> for AuthHeader {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for AuthHeader {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthHeader(<redacted>)")
    }
}

/// Who is calling, as reported by the caller's transport.
///
/// Used for logging only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub identity: String,
    pub addr: String,
}

impl ClientContext {
    pub fn new(identity: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            addr: addr.into(),
        }
    }
}

/// Accepts or rejects a caller's auth header.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, header: &AuthHeader, client: &ClientContext) -> Result<(), CeremonyError>;
}

/// Accepts every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _header: &AuthHeader, _client: &ClientContext) -> Result<(), CeremonyError> {
        Ok(())
    }
}

/// Requires the header to carry one shared token.
#[derive(Clone)]
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenAuth").finish_non_exhaustive()
    }
}

impl Authenticator for StaticTokenAuth {
    fn authenticate(&self, header: &AuthHeader, client: &ClientContext) -> Result<(), CeremonyError> {
        let provided = header.token();
        if provided.is_empty() {
            return Err(CeremonyError::Unauthorized("missing auth token".to_string()));
        }
        if provided != self.token {
            tracing::warn!(client = %client.identity, addr = %client.addr, "Rejected auth token");
            return Err(CeremonyError::Unauthorized("invalid auth token".to_string()));
        }
        Ok(())
    }
}

/// Authenticator selected by settings: a shared token when configured,
/// otherwise every caller is accepted.
#[derive(Debug, Clone)]
pub enum ConfiguredAuth {
    AllowAll(AllowAll),
    Token(StaticTokenAuth),
}

impl ConfiguredAuth {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.auth_token() {
            Some(token) => Self::Token(StaticTokenAuth::new(token)),
            None => Self::AllowAll(AllowAll),
        }
    }
}

impl Authenticator for ConfiguredAuth {
    fn authenticate(&self, header: &AuthHeader, client: &ClientContext) -> Result<(), CeremonyError> {
        match self {
            Self::AllowAll(auth) => auth.authenticate(header, client),
            Self::Token(auth) => auth.authenticate(header, client),
        }
    }
}
