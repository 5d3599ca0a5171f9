//! HTTP routes for the ceremony coordinator.
//!
//! - `health`: Health check and build info (public)
//! - `ceremony`: Key generation, signing and ledger status

pub mod ceremony;
pub mod health;

pub use ceremony::json_config;
pub use health::{build_info, health};
