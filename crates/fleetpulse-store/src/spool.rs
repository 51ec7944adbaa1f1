//! Write spool — buffered persistence for confirmed transitions.
//!
//! Accepts writes without blocking the probe path and guarantees each
//! queued write is attempted at least once while the store is healthy.
//! While the store is down the configured outage policy applies: drop
//! the whole queue (stale transitions are not worth replaying) or keep
//! it for backfill on recovery. Flushing is single-flight per process:
//! enqueuing during an in-flight flush relies on the next scheduled run
//! rather than spawning a second one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use fleetpulse_core::PendingWrite;

use crate::store::DurableStore;

/// What one flush attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Idle,
    /// Everything queued was written, in FIFO order.
    Flushed(usize),
    /// Store down, backfill disabled: the queue was discarded.
    Dropped(usize),
    /// Store down, backfill enabled: the queue was left intact.
    Deferred(usize),
    /// A write failed mid-flush; the failed item and everything behind
    /// it stay queued for the next attempt.
    Aborted { flushed: usize, remaining: usize },
}

impl FlushOutcome {
    /// Whether another flush should be scheduled.
    fn needs_retry(&self) -> bool {
        matches!(self, FlushOutcome::Deferred(_) | FlushOutcome::Aborted { .. })
    }
}

/// In-memory FIFO of confirmed-transition writes.
pub struct WriteSpool {
    store: Arc<dyn DurableStore>,
    health: watch::Receiver<bool>,
    backfill_on_recovery: bool,
    flush_delay: Duration,
    queue: Mutex<VecDeque<PendingWrite>>,
    flush_scheduled: AtomicBool,
}

impl WriteSpool {
    pub fn new(
        store: Arc<dyn DurableStore>,
        health: watch::Receiver<bool>,
        backfill_on_recovery: bool,
        flush_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            health,
            backfill_on_recovery,
            flush_delay,
            queue: Mutex::new(VecDeque::new()),
            flush_scheduled: AtomicBool::new(false),
        })
    }

    /// Append a write and schedule a flush exactly once. A pending
    /// timer or in-progress flush suppresses re-scheduling.
    pub async fn enqueue(self: &Arc<Self>, write: PendingWrite) {
        self.queue.lock().await.push_back(write);
        self.schedule_flush();
    }

    /// Number of writes currently queued.
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    fn schedule_flush(self: &Arc<Self>) {
        if self.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let spool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(spool.flush_delay).await;
            let outcome = spool.flush_now().await;
            spool.flush_scheduled.store(false, Ordering::Release);
            // Items enqueued during the flush, or left behind by an
            // abort/deferral, get the next scheduled run.
            if outcome.needs_retry() || spool.pending().await > 0 {
                spool.schedule_flush();
            }
        });
    }

    /// Flush the queue once, applying the outage policy.
    pub async fn flush_now(&self) -> FlushOutcome {
        let batch: Vec<PendingWrite> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        if !*self.health.borrow() {
            if self.backfill_on_recovery {
                let len = batch.len();
                self.requeue_front(batch).await;
                debug!(deferred = len, "store down; keeping spool for backfill");
                return FlushOutcome::Deferred(len);
            }
            warn!(dropped = batch.len(), "store down; dropping spooled writes");
            return FlushOutcome::Dropped(batch.len());
        }

        for (i, write) in batch.iter().enumerate() {
            if let Err(e) = self.store.write_active_state(
                &write.host_id,
                write.state,
                write.changed_at_ms,
            ) {
                // Stop immediately: skipping the failed item would
                // break FIFO ordering of state writes.
                warn!(host_id = %write.host_id, error = %e, "flush aborted mid-queue");
                let remaining = batch.len() - i;
                self.requeue_front(batch[i..].to_vec()).await;
                return FlushOutcome::Aborted {
                    flushed: i,
                    remaining,
                };
            }
        }

        debug!(flushed = batch.len(), "spool flushed");
        FlushOutcome::Flushed(batch.len())
    }

    /// Put unflushed items back at the queue front, preserving order
    /// ahead of anything enqueued while the flush ran.
    async fn requeue_front(&self, items: Vec<PendingWrite>) {
        let mut queue = self.queue.lock().await;
        for write in items.into_iter().rev() {
            queue.push_front(write);
        }
    }
}
