//! Per-IP rate limiting for ceremony endpoints.
//!
//! Uses actix-governor with the built-in PeerIpKeyExtractor. Every ceremony
//! request burns a payload id, so the limit caps how fast a single client can
//! consume ids and engine time.

use actix_governor::{Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor};
use governor::middleware::NoOpMiddleware;

use crate::config::Settings;

/// Rate limit knobs for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained ceremonies per hour per IP.
    pub ceremonies_per_hour: u32,
    /// Short burst allowance on top of the sustained rate.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ceremonies_per_hour: 600,
            burst: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            ceremonies_per_hour: settings.ceremonies_per_hour(),
            burst: settings.ceremony_burst(),
        }
    }

    /// Seconds between replenished requests. Zero per hour means one per hour.
    pub fn seconds_per_request(&self) -> u64 {
        match self.ceremonies_per_hour {
            0 => 3600,
            n => (3600 / u64::from(n)).max(1),
        }
    }
}

/// Governor middleware keyed by peer IP.
pub type RateLimiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Governor config for ceremony endpoints.
///
/// Fails when the builder rejects the settings (for example a zero burst).
pub fn ceremony_limiter_config(
    config: &RateLimitConfig,
) -> Result<GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>, String> {
    GovernorConfigBuilder::default()
        .seconds_per_request(config.seconds_per_request())
        .burst_size(config.burst)
        .finish()
        .ok_or_else(|| format!("invalid rate limit settings: {config:?}"))
}
