//! DB health monitor — decides when the process is in degraded mode.
//!
//! A self-rescheduling loop, not a fixed-rate timer: each check pings
//! the durable store; success resets the retry interval and announces
//! recovery, failure doubles the interval up to a cap. Recovery is
//! therefore detected at the fast interval while outages back off.
//! The loop is single-flight by construction: one task owns the state
//! and never runs concurrently with itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleetpulse_core::config::DbHealthConfig;

use crate::store::DurableStore;

/// Next retry interval given the previous one and the check outcome.
///
/// Kept as a pure function so the backoff sequence is independently
/// testable; the loop threads the current value through each step
/// rather than capturing a timer in a closure.
pub fn next_retry_ms(prev_ms: u64, ok: bool, initial_ms: u64, max_ms: u64) -> u64 {
    if ok {
        initial_ms
    } else {
        prev_ms.saturating_mul(2).min(max_ms)
    }
}

/// Periodically verifies storage connectivity and publishes the single
/// `connected` boolean over a watch channel.
pub struct DbHealthMonitor {
    store: Arc<dyn DurableStore>,
    initial_retry_ms: u64,
    max_retry_ms: u64,
    status_tx: watch::Sender<bool>,
}

impl DbHealthMonitor {
    /// Create a monitor; the returned receiver observes connectivity
    /// flips (it starts optimistically connected until the first check).
    pub fn new(store: Arc<dyn DurableStore>, config: &DbHealthConfig) -> (Self, watch::Receiver<bool>) {
        let (status_tx, status_rx) = watch::channel(true);
        (
            Self {
                store,
                initial_retry_ms: config.initial_retry_ms,
                max_retry_ms: config.max_retry_ms,
                status_tx,
            },
            status_rx,
        )
    }

    /// Subscribe to connectivity flips.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status_tx.subscribe()
    }

    /// Run the check-and-reschedule loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut retry_ms = self.initial_retry_ms;
        info!(initial_retry_ms = retry_ms, "db health monitor started");

        loop {
            let ok = self.store.health_ping().is_ok();
            let was = *self.status_tx.borrow();

            if ok != was {
                // Status-change notifications fire on flips only; a run
                // of failures announces degraded mode exactly once.
                if ok {
                    info!("durable store reachable again; leaving degraded mode");
                } else {
                    warn!("durable store unreachable; entering degraded mode");
                }
                let _ = self.status_tx.send(ok);
            }

            retry_ms = next_retry_ms(retry_ms, ok, self.initial_retry_ms, self.max_retry_ms);
            debug!(ok, retry_ms, "db health check complete");

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(retry_ms)) => {}
                _ = shutdown.changed() => {
                    debug!("db health monitor shutting down");
                    break;
                }
            }
        }
    }
}
