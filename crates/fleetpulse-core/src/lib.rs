//! fleetpulse-core — shared domain types and configuration.
//!
//! Everything the other FleetPulse crates agree on lives here: the host
//! and live-state types, transition events, group summaries, and the
//! `fleetpulse.toml` configuration parser with startup validation.

pub mod config;
pub mod types;

pub use config::{ConfigError, DbHealthConfig, DebounceConfig, FleetConfig, GroupConfig};
pub use types::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
