//! Update feed events published by the live state store.

use serde::{Deserialize, Serialize};

use fleetpulse_core::{GroupName, HostLiveState, TransitionEvent};

/// One incremental event on the continuous update feed.
///
/// Host updates fire on every applied sample, transitioning or not;
/// health status fires on flips only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    HostUpdate {
        group: GroupName,
        state: HostLiveState,
    },
    Transition(TransitionEvent),
    HealthStatus {
        degraded: bool,
        message: String,
    },
}

impl FeedEvent {
    /// SSE event name for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::HostUpdate { .. } => "host_update",
            FeedEvent::Transition(_) => "transition",
            FeedEvent::HealthStatus { .. } => "health_status",
        }
    }
}
