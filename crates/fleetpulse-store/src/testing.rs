//! Fault-injecting store double used by tests across the workspace.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use fleetpulse_core::{Host, HostState};

use crate::error::{StoreError, StoreResult};
use crate::store::{DurableStore, RedbStore, SampleRow, StateRow};

/// An in-memory store whose failures can be toggled at runtime:
/// pings, writes (optionally after N successes), and inventory reads
/// can each be made to fail independently.
pub struct FlakyStore {
    inner: RedbStore,
    fail_pings: AtomicBool,
    fail_lists: AtomicBool,
    fail_writes_after: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: RedbStore::open_in_memory().expect("in-memory store"),
            fail_pings: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
            fail_writes_after: AtomicUsize::new(usize::MAX),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_pings(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more state writes succeed, then fail the rest.
    pub fn fail_writes_after(&self, n: usize) {
        self.writes.store(0, Ordering::SeqCst);
        self.fail_writes_after.store(n, Ordering::SeqCst);
    }

    /// Successful state writes so far (since the last `fail_writes_after`).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn unavailable(what: &str) -> StoreError {
        StoreError::Unavailable(format!("injected fault: {what}"))
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for FlakyStore {
    fn put_host(&self, host: &Host) -> StoreResult<()> {
        self.inner.put_host(host)
    }

    fn remove_host(&self, host_id: &str) -> StoreResult<bool> {
        self.inner.remove_host(host_id)
    }

    fn list_hosts(&self, group: &str) -> StoreResult<Vec<Host>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Self::unavailable("list_hosts"));
        }
        self.inner.list_hosts(group)
    }

    fn list_all_hosts(&self) -> StoreResult<Vec<Host>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Self::unavailable("list_all_hosts"));
        }
        self.inner.list_all_hosts()
    }

    fn write_active_state(
        &self,
        host_id: &str,
        state: HostState,
        changed_at_ms: u64,
    ) -> StoreResult<()> {
        if self.writes.load(Ordering::SeqCst) >= self.fail_writes_after.load(Ordering::SeqCst) {
            return Err(Self::unavailable("write_active_state"));
        }
        self.inner.write_active_state(host_id, state, changed_at_ms)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn current_state(&self, host_id: &str) -> StoreResult<Option<StateRow>> {
        self.inner.current_state(host_id)
    }

    fn state_history(&self, host_id: &str) -> StoreResult<Vec<StateRow>> {
        self.inner.state_history(host_id)
    }

    fn current_outages(&self) -> StoreResult<Vec<StateRow>> {
        self.inner.current_outages()
    }

    fn record_sample(&self, sample: &SampleRow) -> StoreResult<()> {
        self.inner.record_sample(sample)
    }

    fn read_samples(
        &self,
        host_id: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> StoreResult<Vec<SampleRow>> {
        self.inner.read_samples(host_id, start_ms, end_ms)
    }

    fn health_ping(&self) -> StoreResult<()> {
        if self.fail_pings.load(Ordering::SeqCst) {
            return Err(Self::unavailable("health_ping"));
        }
        self.inner.health_ping()
    }
}
