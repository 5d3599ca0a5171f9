//! Middleware for the coordinator HTTP surface.
//!
//! Provides cross-cutting concerns like rate limiting and the service token
//! check that apply across all routes.

pub mod auth;
pub mod rate_limit;

pub use auth::InternalAuth;
pub use rate_limit::{RateLimitConfig, RateLimiter, ceremony_limiter_config};
