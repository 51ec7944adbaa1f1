//! Domain types shared across the FleetPulse crates.
//!
//! These types describe monitored hosts, their live reachability state,
//! confirmed transitions, and the writes queued for the durable store.
//! All types are serializable to/from JSON for storage and for the API.

use serde::{Deserialize, Serialize};

/// Unique identifier for a monitored host.
pub type HostId = String;

/// Name of a host group (e.g. "branches", "dvrs", "servers").
pub type GroupName = String;

// ── Host identity ──────────────────────────────────────────────────

/// A monitored network endpoint, owned by the inventory source and
/// mirrored read-only into the live store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub ip: String,
    pub name: String,
    pub group: GroupName,
}

// ── Live state ─────────────────────────────────────────────────────

/// Confirmed durable state of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Online,
    Offline,
}

impl HostState {
    /// The opposite state.
    pub fn flipped(self) -> Self {
        match self {
            HostState::Online => HostState::Offline,
            HostState::Offline => HostState::Online,
        }
    }

    /// Map a raw sample polarity to a state.
    pub fn from_success(success: bool) -> Self {
        if success {
            HostState::Online
        } else {
            HostState::Offline
        }
    }
}

/// Current raw reachability state of one host in one group.
///
/// Mutated exclusively by the live state store; never destroyed while
/// the host remains in inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostLiveState {
    pub host_id: HostId,
    /// Last raw sample polarity.
    pub success: bool,
    /// Last observed round-trip latency in milliseconds (0 when down).
    pub latency_ms: f64,
    /// Unix timestamp (ms) of the last applied sample.
    pub sample_at_ms: u64,
    /// Unix timestamp (ms) of the last raw polarity flip, if any.
    pub last_transition_at_ms: Option<u64>,
}

impl HostLiveState {
    /// Initial state for a host first seen via inventory: down, no
    /// latency, no transition recorded for its first appearance.
    pub fn initial(host_id: &str) -> Self {
        Self {
            host_id: host_id.to_string(),
            success: false,
            latency_ms: 0.0,
            sample_at_ms: 0,
            last_transition_at_ms: None,
        }
    }
}

/// Result of probing a single address within one batched sweep.
/// Ephemeral: produced once per cycle, consumed immediately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub ip: String,
    pub alive: bool,
    pub latency_ms: f64,
}

impl ProbeResult {
    /// Stand-in for an address absent from the batched probe output.
    pub fn unreachable(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            alive: false,
            latency_ms: 0.0,
        }
    }
}

// ── Transitions ────────────────────────────────────────────────────

/// A raw polarity flip observed by the live state store, kept in a
/// bounded per-group ring buffer for recent-event views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionEvent {
    pub host_id: HostId,
    pub ip: String,
    pub name: String,
    pub from: HostState,
    pub to: HostState,
    pub at_ms: u64,
    pub group: GroupName,
}

/// Derived per-group aggregate, computed at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    /// Average latency of active hosts only; 0.0 if none are active.
    pub avg_latency_ms: f64,
    pub transitions_total: u64,
}

// ── Persistence ────────────────────────────────────────────────────

/// A confirmed-transition write queued for the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingWrite {
    pub host_id: HostId,
    pub state: HostState,
    /// Exact transition instant (ms), not the detection instant.
    pub changed_at_ms: u64,
}
