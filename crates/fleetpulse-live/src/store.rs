//! LiveStateStore — single authoritative source of current host state.
//!
//! Consumes prober output, detects polarity flips, keeps a bounded
//! transition ring per group, and publishes every applied sample to the
//! update feed. All reads are point-in-time consistent with respect to
//! applied updates: a snapshot is one copy under a read lock.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use fleetpulse_core::{
    GroupSummary, Host, HostLiveState, HostState, TransitionEvent, epoch_ms,
};

use crate::feed::FeedEvent;

/// Feed channel depth; lagging subscribers lose oldest events first and
/// keep receiving, ingestion is never blocked.
const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct HostEntry {
    host: Host,
    live: HostLiveState,
}

#[derive(Debug, Default)]
struct GroupState {
    hosts: BTreeMap<String, HostEntry>,
    events: VecDeque<TransitionEvent>,
    transitions_total: u64,
}

#[derive(Debug, Default)]
struct Inner {
    groups: BTreeMap<String, GroupState>,
    degraded_mode: bool,
    status_message: Option<String>,
}

/// One host in a snapshot: identity plus live state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSnapshot {
    #[serde(flatten)]
    pub host: Host,
    pub success: bool,
    pub latency_ms: f64,
    pub sample_at_ms: u64,
    pub last_transition_at_ms: Option<u64>,
}

/// Point-in-time view of one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSnapshot {
    pub hosts: Vec<HostSnapshot>,
    pub summary: GroupSummary,
    pub recent_events: Vec<TransitionEvent>,
}

/// Point-in-time view of the whole fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetSnapshot {
    pub groups: BTreeMap<String, GroupSnapshot>,
    pub degraded_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub server_time_ms: u64,
}

/// The in-memory fleet state table. Cheap to clone handles are not
/// needed; share it behind an `Arc`.
pub struct LiveStateStore {
    inner: RwLock<Inner>,
    feed: broadcast::Sender<FeedEvent>,
    event_capacity: usize,
}

impl LiveStateStore {
    pub fn new(event_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            feed,
            event_capacity,
        }
    }

    /// Subscribe to the update feed.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    /// Reconcile a group's host set without resetting live fields of
    /// already-known hosts. New hosts start down with no transition
    /// recorded for their first appearance; hosts gone from inventory
    /// are dropped.
    pub async fn set_inventory(&self, group: &str, hosts: Vec<Host>) {
        let mut inner = self.inner.write().await;
        let state = inner.groups.entry(group.to_string()).or_default();

        state
            .hosts
            .retain(|id, _| hosts.iter().any(|h| &h.id == id));

        for host in hosts {
            match state.hosts.get_mut(&host.id) {
                Some(entry) => {
                    // Identity fields may change (re-addressed host).
                    entry.host = host;
                }
                None => {
                    let live = HostLiveState::initial(&host.id);
                    debug!(group, host_id = %host.id, "host joined inventory");
                    state.hosts.insert(host.id.clone(), HostEntry { host, live });
                }
            }
        }
    }

    /// Merge one probe sample into a host's live state. Returns the
    /// transition event if the sample flipped the raw polarity.
    ///
    /// Every applied sample publishes a feed update, transitioning or
    /// not, so observers see fresh latency and timestamps.
    pub async fn update_host(
        &self,
        group: &str,
        host: &Host,
        alive: bool,
        latency_ms: f64,
        at_ms: u64,
    ) -> Option<TransitionEvent> {
        let mut transition = None;

        let live = {
            let mut inner = self.inner.write().await;
            let state = inner.groups.entry(group.to_string()).or_default();

            let entry = state
                .hosts
                .entry(host.id.clone())
                .or_insert_with(|| HostEntry {
                    host: host.clone(),
                    live: HostLiveState {
                        host_id: host.id.clone(),
                        // First sight via a sample: the sample is the
                        // baseline, not a transition.
                        success: alive,
                        latency_ms,
                        sample_at_ms: at_ms,
                        last_transition_at_ms: None,
                    },
                });

            if entry.live.success != alive {
                let event = TransitionEvent {
                    host_id: host.id.clone(),
                    ip: entry.host.ip.clone(),
                    name: entry.host.name.clone(),
                    from: HostState::from_success(entry.live.success),
                    to: HostState::from_success(alive),
                    at_ms,
                    group: group.to_string(),
                };
                entry.live.last_transition_at_ms = Some(at_ms);
                transition = Some(event.clone());

                state.transitions_total += 1;
                state.events.push_front(event);
                state.events.truncate(self.event_capacity);
            }

            entry.live.success = alive;
            entry.live.latency_ms = latency_ms;
            entry.live.sample_at_ms = at_ms;
            entry.live.clone()
        };

        if let Some(event) = &transition {
            info!(
                group,
                host_id = %event.host_id,
                from = ?event.from,
                to = ?event.to,
                "raw state flip"
            );
            let _ = self.feed.send(FeedEvent::Transition(event.clone()));
        }
        let _ = self.feed.send(FeedEvent::HostUpdate {
            group: group.to_string(),
            state: live,
        });

        transition
    }

    /// Flip the process-wide degraded flag; publishes a health-status
    /// feed event on flips only.
    pub async fn set_degraded(&self, degraded: bool, message: &str) {
        let flipped = {
            let mut inner = self.inner.write().await;
            let flipped = inner.degraded_mode != degraded;
            inner.degraded_mode = degraded;
            inner.status_message = if degraded {
                Some(message.to_string())
            } else {
                None
            };
            flipped
        };
        if flipped {
            let _ = self.feed.send(FeedEvent::HealthStatus {
                degraded,
                message: message.to_string(),
            });
        }
    }

    /// Whether the process currently runs without persistence.
    pub async fn degraded(&self) -> bool {
        self.inner.read().await.degraded_mode
    }

    /// Copy the full fleet view. O(hosts); holds the read lock for one
    /// copy and never blocks writers longer than that.
    pub async fn snapshot(&self) -> FleetSnapshot {
        let inner = self.inner.read().await;
        let mut groups = BTreeMap::new();
        for (name, state) in &inner.groups {
            let hosts: Vec<HostSnapshot> = state
                .hosts
                .values()
                .map(|e| HostSnapshot {
                    host: e.host.clone(),
                    success: e.live.success,
                    latency_ms: e.live.latency_ms,
                    sample_at_ms: e.live.sample_at_ms,
                    last_transition_at_ms: e.live.last_transition_at_ms,
                })
                .collect();
            let summary = summarize(&hosts, state.transitions_total);
            groups.insert(
                name.clone(),
                GroupSnapshot {
                    hosts,
                    summary,
                    recent_events: state.events.iter().cloned().collect(),
                },
            );
        }
        FleetSnapshot {
            groups,
            degraded_mode: inner.degraded_mode,
            status_message: inner.status_message.clone(),
            server_time_ms: epoch_ms(),
        }
    }
}

fn summarize(hosts: &[HostSnapshot], transitions_total: u64) -> GroupSummary {
    let total = hosts.len();
    let active = hosts.iter().filter(|h| h.success).count();
    let avg_latency_ms = if active > 0 {
        hosts
            .iter()
            .filter(|h| h.success)
            .map(|h| h.latency_ms)
            .sum::<f64>()
            / active as f64
    } else {
        0.0
    };
    GroupSummary {
        total,
        active,
        inactive: total - active,
        avg_latency_ms,
        transitions_total,
    }
}
