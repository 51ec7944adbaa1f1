//! Per-group probe loop.
//!
//! Each group runs one `Prober` on its own fixed-interval loop,
//! independent of other groups. A cycle never fails: inventory refresh
//! falls back to the last successful copy, probe-tool errors degrade to
//! all-unreachable stand-ins, and durable writes are best-effort behind
//! the DB health gate. The live state store is updated unconditionally
//! for every inventory host on every cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleetpulse_core::{Host, HostState, PendingWrite, ProbeResult, epoch_ms};
use fleetpulse_engine::{Classification, MinuteWindow, Sample};
use fleetpulse_live::LiveStateStore;
use fleetpulse_store::{DurableStore, SampleRow, WriteSpool};

use crate::pinger::Pinger;

/// Receives confirmed transitions for operator-facing delivery.
/// Invoked on confirmed changes only, never on unstable windows.
pub trait Notifier: Send + Sync {
    /// `exact_at_ms` is the recovered transition instant, not the
    /// detection time.
    fn notify(&self, state: HostState, host: &Host, exact_at_ms: u64);
}

/// Default notifier: structured log lines.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, state: HostState, host: &Host, exact_at_ms: u64) {
        match state {
            HostState::Offline => warn!(
                host_id = %host.id,
                name = %host.name,
                ip = %host.ip,
                since_ms = exact_at_ms,
                "host confirmed DOWN"
            ),
            HostState::Online => info!(
                host_id = %host.id,
                name = %host.name,
                ip = %host.ip,
                since_ms = exact_at_ms,
                "host confirmed UP"
            ),
        }
    }
}

/// Static knobs for one group's prober.
#[derive(Debug, Clone)]
pub struct ProberSettings {
    pub group: String,
    pub interval: Duration,
    pub window: MinuteWindow,
}

/// One group's probe loop state.
pub struct Prober {
    settings: ProberSettings,
    store: Arc<dyn DurableStore>,
    live: Arc<LiveStateStore>,
    pinger: Arc<dyn Pinger>,
    spool: Arc<WriteSpool>,
    health: watch::Receiver<bool>,
    notifier: Arc<dyn Notifier>,
    /// Last successfully refreshed inventory; reused across refresh
    /// failures so probing survives storage outages.
    inventory: Vec<Host>,
    /// Trailing raw samples per host, bounded to the minute window.
    histories: HashMap<String, Vec<Sample>>,
    /// Last state confirmed by the classifier, per host.
    confirmed: HashMap<String, HostState>,
}

impl Prober {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: ProberSettings,
        store: Arc<dyn DurableStore>,
        live: Arc<LiveStateStore>,
        pinger: Arc<dyn Pinger>,
        spool: Arc<WriteSpool>,
        health: watch::Receiver<bool>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            store,
            live,
            pinger,
            spool,
            health,
            notifier,
            inventory: Vec::new(),
            histories: HashMap::new(),
            confirmed: HashMap::new(),
        }
    }

    /// Run probe cycles until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            group = %self.settings.group,
            interval_ms = self.settings.interval.as_millis() as u64,
            "prober started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {
                    self.cycle(epoch_ms()).await;
                }
                _ = shutdown.changed() => {
                    debug!(group = %self.settings.group, "prober shutting down");
                    break;
                }
            }
        }
    }

    /// One probe cycle. Public so tests can drive virtual time.
    pub async fn cycle(&mut self, now_ms: u64) {
        let group = self.settings.group.clone();

        // Inventory refresh; a failure keeps the last good copy.
        match self.store.list_hosts(&group) {
            Ok(hosts) => {
                self.inventory = hosts;
                self.live.set_inventory(&group, self.inventory.clone()).await;
                self.histories
                    .retain(|id, _| self.inventory.iter().any(|h| &h.id == id));
            }
            Err(e) => {
                warn!(%group, error = %e, "inventory refresh failed; reusing last inventory");
            }
        }
        if self.inventory.is_empty() {
            return;
        }

        // One batched sweep for the whole group.
        let ips: Vec<String> = self.inventory.iter().map(|h| h.ip.clone()).collect();
        let results = match self.pinger.probe(ips).await {
            Ok(results) => results,
            Err(e) => {
                warn!(%group, error = %e, "batched probe failed; treating cycle as unreachable");
                Vec::new()
            }
        };
        let by_ip: HashMap<&str, &ProbeResult> =
            results.iter().map(|r| (r.ip.as_str(), r)).collect();

        let hosts = self.inventory.clone();
        for host in &hosts {
            // Absent addresses get a zero-result stand-in.
            let (alive, latency_ms) = match by_ip.get(host.ip.as_str()) {
                Some(r) => (r.alive, r.latency_ms),
                None => (false, 0.0),
            };

            // Live update happens first and unconditionally; nothing on
            // the durable path may prevent or delay it.
            self.live
                .update_host(&group, host, alive, latency_ms, now_ms)
                .await;

            let classification = {
                let history = self.histories.entry(host.id.clone()).or_default();
                history.push(Sample {
                    at_ms: now_ms,
                    success: alive,
                });
                let horizon = now_ms.saturating_sub(self.settings.window.window_ms());
                history.retain(|s| s.at_ms >= horizon);
                self.settings.window.classify(history, now_ms)
            };

            match classification {
                Classification::Up { since_ms } => {
                    self.confirm(host, HostState::Online, since_ms).await;
                }
                Classification::Down { since_ms } => {
                    self.confirm(host, HostState::Offline, since_ms).await;
                }
                Classification::Unstable => {}
            }

            // Best-effort raw sample logging, gated on DB health.
            if *self.health.borrow() {
                let row = SampleRow {
                    host_id: host.id.clone(),
                    at_ms: now_ms,
                    alive,
                    latency_ms,
                };
                if let Err(e) = self.store.record_sample(&row) {
                    debug!(%group, host_id = %host.id, error = %e, "sample write skipped");
                }
            }
        }
    }

    /// Apply a confirmed classification: notify and persist only when
    /// it changes the host's confirmed state.
    async fn confirm(&mut self, host: &Host, state: HostState, exact_at_ms: u64) {
        let prev = match self.confirmed.get(&host.id) {
            Some(s) => *s,
            None => {
                // Seed from the durable active row when readable;
                // default Online so a host that is down at startup
                // still raises its confirmed DOWN.
                let seeded = self
                    .store
                    .current_state(&host.id)
                    .ok()
                    .flatten()
                    .map(|row| row.state)
                    .unwrap_or(HostState::Online);
                self.confirmed.insert(host.id.clone(), seeded);
                seeded
            }
        };

        if prev == state {
            return;
        }
        self.confirmed.insert(host.id.clone(), state);

        self.notifier.notify(state, host, exact_at_ms);
        self.spool
            .enqueue(PendingWrite {
                host_id: host.id.clone(),
                state,
                changed_at_ms: exact_at_ms,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use fleetpulse_store::testing::FlakyStore;

    use crate::pinger::{BoxFuture, PingError};

    /// Pinger double that replays a fixed outcome per address.
    struct ScriptedPinger {
        alive: Mutex<HashMap<String, bool>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl ScriptedPinger {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                alive: Mutex::new(HashMap::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn set_alive(&self, ip: &str, alive: bool) {
            self.alive.lock().unwrap().insert(ip.to_string(), alive);
        }

        fn fail_probes(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl Pinger for ScriptedPinger {
        fn probe(&self, ips: Vec<String>) -> BoxFuture<Result<Vec<ProbeResult>, PingError>> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Box::pin(async { Err(PingError::Spawn("scripted failure".into())) });
            }
            let map = self.alive.lock().unwrap().clone();
            Box::pin(async move {
                Ok(ips
                    .iter()
                    .filter_map(|ip| {
                        map.get(ip).map(|&alive| ProbeResult {
                            ip: ip.clone(),
                            alive,
                            latency_ms: if alive { 1.5 } else { 0.0 },
                        })
                    })
                    .collect())
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<(String, HostState, u64)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, state: HostState, host: &Host, exact_at_ms: u64) {
            self.calls
                .lock()
                .unwrap()
                .push((host.id.clone(), state, exact_at_ms));
        }
    }

    struct Rig {
        store: Arc<FlakyStore>,
        live: Arc<LiveStateStore>,
        pinger: Arc<ScriptedPinger>,
        notifier: Arc<RecordingNotifier>,
        prober: Prober,
    }

    fn host(id: &str, ip: &str) -> Host {
        Host {
            id: id.to_string(),
            ip: ip.to_string(),
            name: format!("host {id}"),
            group: "branches".to_string(),
        }
    }

    fn rig(consecutive: u32) -> Rig {
        let store = Arc::new(FlakyStore::new());
        let live = Arc::new(LiveStateStore::new(500));
        let pinger = ScriptedPinger::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let health = watch::channel(true).1;
        let spool = WriteSpool::new(
            store.clone(),
            health.clone(),
            false,
            Duration::from_millis(1),
        );
        let settings = ProberSettings {
            group: "branches".to_string(),
            interval: Duration::from_millis(1000),
            window: MinuteWindow {
                consecutive_minutes_required: consecutive,
                sequence_window_minutes: 6,
            },
        };
        let prober = Prober::new(
            settings,
            store.clone(),
            live.clone(),
            pinger.clone(),
            spool,
            health,
            notifier.clone(),
        );
        Rig {
            store,
            live,
            pinger,
            notifier,
            prober,
        }
    }

    const MIN: u64 = 60_000;

    #[tokio::test]
    async fn cycle_updates_live_store_with_standins() {
        let mut r = rig(5);
        r.store.put_host(&host("h1", "10.1.0.1")).unwrap();
        r.store.put_host(&host("h2", "10.1.0.2")).unwrap();
        r.pinger.set_alive("10.1.0.1", true);
        // 10.1.0.2 is absent from the probe output entirely.

        r.prober.cycle(1_000).await;

        let snap = r.live.snapshot().await;
        let group = &snap.groups["branches"];
        assert_eq!(group.summary.total, 2);
        assert_eq!(group.summary.active, 1);
        let h2 = group.hosts.iter().find(|h| h.host.id == "h2").unwrap();
        assert!(!h2.success);
        assert_eq!(h2.latency_ms, 0.0);
        assert_eq!(h2.sample_at_ms, 1_000);
    }

    #[tokio::test]
    async fn inventory_failure_reuses_last_good_copy() {
        let mut r = rig(5);
        r.store.put_host(&host("h1", "10.1.0.1")).unwrap();
        r.pinger.set_alive("10.1.0.1", true);
        r.prober.cycle(1_000).await;

        // Storage goes away; the cycle still probes the known host.
        r.store.fail_lists(true);
        r.prober.cycle(2_000).await;

        let snap = r.live.snapshot().await;
        let h1 = &snap.groups["branches"].hosts[0];
        assert_eq!(h1.sample_at_ms, 2_000);
        assert!(h1.success);
    }

    #[tokio::test]
    async fn probe_tool_failure_degrades_to_unreachable() {
        let mut r = rig(5);
        r.store.put_host(&host("h1", "10.1.0.1")).unwrap();
        r.pinger.set_alive("10.1.0.1", true);
        r.prober.cycle(1_000).await;

        r.pinger.fail_probes(true);
        r.prober.cycle(2_000).await;

        let snap = r.live.snapshot().await;
        assert!(!snap.groups["branches"].hosts[0].success);
    }

    #[tokio::test]
    async fn confirmed_down_notifies_once_and_spools() {
        let mut r = rig(2);
        r.store.put_host(&host("h1", "10.1.0.1")).unwrap();
        r.pinger.set_alive("10.1.0.1", false);

        // Two uniform failing minutes confirm DOWN; further failing
        // minutes must not re-notify.
        for minute in 0..4u64 {
            r.prober.cycle(minute * MIN + 30_000).await;
        }

        let calls = r.notifier.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, HostState::Offline);

        // The spool delivers the confirmed transition to the store.
        r.prober.spool.flush_now().await;
        let row = r.store.current_state("h1").unwrap().unwrap();
        assert_eq!(row.state, HostState::Offline);
    }

    #[tokio::test]
    async fn recovery_notifies_with_exact_instant() {
        let mut r = rig(2);
        r.store.put_host(&host("h1", "10.1.0.1")).unwrap();
        r.store
            .write_active_state("h1", HostState::Offline, 0)
            .unwrap();

        r.pinger.set_alive("10.1.0.1", false);
        r.prober.cycle(30_000).await;
        r.pinger.set_alive("10.1.0.1", true);
        for minute in 1..4u64 {
            r.prober.cycle(minute * MIN + 30_000).await;
        }

        let calls = r.notifier.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let (id, state, exact) = &calls[0];
        assert_eq!(id, "h1");
        assert_eq!(*state, HostState::Online);
        // The last failing sample, not the detection instant.
        assert_eq!(*exact, 30_000);
    }

    #[tokio::test]
    async fn storage_outage_never_blocks_live_updates() {
        let mut r = rig(2);
        r.store.put_host(&host("h1", "10.1.0.1")).unwrap();
        r.pinger.set_alive("10.1.0.1", true);
        r.prober.cycle(1_000).await;

        // Everything durable starts failing.
        r.store.fail_lists(true);
        r.store.fail_pings(true);
        r.store.fail_writes_after(0);

        for minute in 1..5u64 {
            r.prober.cycle(minute * MIN).await;
        }

        let snap = r.live.snapshot().await;
        let h1 = &snap.groups["branches"].hosts[0];
        assert_eq!(h1.sample_at_ms, 4 * MIN);
        assert!(h1.success);
    }
}
