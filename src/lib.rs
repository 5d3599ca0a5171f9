// Crate-level lint configuration
// Allow noisy pedantic/cargo lints that aren't worth fixing individually
#![allow(clippy::multiple_crate_versions)] // Transitive deps, can't easily fix
#![allow(clippy::missing_errors_doc)] // Would require extensive doc changes
#![allow(clippy::missing_panics_doc)] // Would require extensive doc changes
#![allow(clippy::must_use_candidate)] // Too many false positives for internal APIs
#![allow(clippy::module_name_repetitions)] // Acceptable for clarity (e.g., CeremonyError in error mod)
#![allow(clippy::doc_markdown)] // Too strict about backticks in docs
#![allow(clippy::missing_const_for_fn)] // Often debatable, runtime doesn't benefit

//! Ceremony Coordinator
//!
//! Validation and sequencing layer in front of a threshold signing engine.
//! Callers submit key generation and offline signing requests; the
//! coordinator checks them, makes sure every payload id is used at most once,
//! hands accepted ceremonies to the engine and returns a result envelope.
//!
//! ## Surfaces
//!
//! - **String boundary** ([`ext`]): JSON in, JSON envelope out. Never panics.
//! - **HTTP** ([`routes`]): the same operations over actix-web, served by the
//!   `ceremony-coordinator` binary.
//!
//! ## Validation
//!
//! Requests are rejected before dispatch when the caller is not authorized,
//! the roster has duplicate ids or addresses, the threshold is out of range,
//! the payload id was already used, or signing key material does not match
//! the key generation it claims to come from.
//!
//! ## Ciphersuites
//!
//! The bundled [`engine::LocalFrostEngine`] runs FROST over secp256k1 or
//! ed25519.

pub mod auth;
pub mod ceremony;
pub mod config;
pub mod engine;
pub mod error;
pub mod ext;
pub mod middleware;
pub mod routes;
pub mod storage;

#[cfg(feature = "otel")]
pub mod telemetry;

#[cfg(not(feature = "otel"))]
pub mod telemetry {
    //! Stub telemetry module when OpenTelemetry is disabled.

    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    /// Initialize tracing with console output only.
    pub fn init_tracing() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ceremony_coordinator=info,actix_web=info".into());
        let fmt_layer = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    /// No-op shutdown when OpenTelemetry is disabled.
    pub fn shutdown_tracing() {}
}

// Re-export commonly used types
pub use ceremony::{Coordinator, DefaultCoordinator, ResultEnvelope};
pub use config::{Ciphersuite, Settings};
pub use engine::{LocalFrostEngine, SigningEngine};
pub use error::CeremonyError;
pub use ext::{ext_run_keygen, ext_run_sign};
