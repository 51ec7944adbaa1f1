//! fleetpulse.toml configuration parser.
//!
//! All knobs have defaults matching normal fleet operation; an invalid
//! configuration (non-positive thresholds or intervals) is rejected at
//! startup and is fatal.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration validation errors. These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("db_health max_retry_ms ({max}) must be >= initial_retry_ms ({initial})")]
    RetryRange { initial: u64, max: u64 },

    #[error("duplicate group name: {0}")]
    DuplicateGroup(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Host groups probed independently.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub db_health: DbHealthConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Per-group probe cadence override.
    pub probe_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Default cadence of the per-group probe loop.
    pub interval_ms: u64,
    /// Per-probe timeout handed to the ping tool, in milliseconds.
    pub timeout_ms: u64,
    /// Path to the batched ping binary.
    pub fping_path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timeout_ms: 500,
            fping_path: "fping".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Consecutive failing samples before a DOWN is confirmed.
    pub fail_threshold: u32,
    /// Consecutive succeeding samples before an UP is confirmed.
    pub recovery_threshold: u32,
    /// Uniform minute-buckets required by the live classifier.
    pub consecutive_minutes_required: u32,
    /// Trailing window is `sequence_window_minutes + 1` minutes.
    pub sequence_window_minutes: u32,
    /// Minimum sample count before an all-failure range may be called
    /// an outage rather than a monitoring gap.
    pub min_incident_samples: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 10,
            recovery_threshold: 10,
            consecutive_minutes_required: 5,
            sequence_window_minutes: 6,
            min_incident_samples: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Transition ring-buffer capacity per group.
    pub buffer_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbHealthConfig {
    /// Retry interval after a successful health check.
    pub initial_retry_ms: u64,
    /// Backoff cap while the store stays unreachable.
    pub max_retry_ms: u64,
}

impl Default for DbHealthConfig {
    fn default() -> Self {
        Self {
            initial_retry_ms: 10_000,
            max_retry_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Keep queued writes across an outage and replay them on recovery
    /// instead of dropping them.
    pub backfill_on_recovery: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backfill_on_recovery: false,
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            probe: ProbeConfig::default(),
            debounce: DebounceConfig::default(),
            events: EventsConfig::default(),
            db_health: DbHealthConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config with one group, for first-run setups.
    pub fn scaffold(group: &str) -> Self {
        Self {
            groups: vec![GroupConfig {
                name: group.to_string(),
                probe_interval_ms: None,
            }],
            ..Self::default()
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.fail_threshold == 0 {
            return Err(ConfigError::NonPositive("debounce.fail_threshold"));
        }
        if self.debounce.recovery_threshold == 0 {
            return Err(ConfigError::NonPositive("debounce.recovery_threshold"));
        }
        if self.debounce.consecutive_minutes_required == 0 {
            return Err(ConfigError::NonPositive(
                "debounce.consecutive_minutes_required",
            ));
        }
        if self.debounce.sequence_window_minutes == 0 {
            return Err(ConfigError::NonPositive("debounce.sequence_window_minutes"));
        }
        if self.probe.interval_ms == 0 {
            return Err(ConfigError::NonPositive("probe.interval_ms"));
        }
        if self.events.buffer_capacity == 0 {
            return Err(ConfigError::NonPositive("events.buffer_capacity"));
        }
        if self.db_health.initial_retry_ms == 0 {
            return Err(ConfigError::NonPositive("db_health.initial_retry_ms"));
        }
        if self.db_health.max_retry_ms < self.db_health.initial_retry_ms {
            return Err(ConfigError::RetryRange {
                initial: self.db_health.initial_retry_ms,
                max: self.db_health.max_retry_ms,
            });
        }
        for (i, g) in self.groups.iter().enumerate() {
            if self.groups[..i].iter().any(|other| other.name == g.name) {
                return Err(ConfigError::DuplicateGroup(g.name.clone()));
            }
            if g.probe_interval_ms == Some(0) {
                return Err(ConfigError::NonPositive("groups.probe_interval_ms"));
            }
        }
        Ok(())
    }

    /// Effective probe cadence for a group.
    pub fn probe_interval_ms(&self, group: &str) -> u64 {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .and_then(|g| g.probe_interval_ms)
            .unwrap_or(self.probe.interval_ms)
    }
}
