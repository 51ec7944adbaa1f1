//! RedbStore — redb-backed durable store for FleetPulse.
//!
//! Persists the host inventory, the append-only per-host state log
//! (single-active-row pattern: transitions mark the previous active row
//! inactive and insert a new active row, so "current state" stays a
//! point lookup while the full audit trail is retained), and the raw
//! probe sample log used for incident reconstruction. Supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fleetpulse_core::{Host, HostState};

use crate::error::{StoreError, StoreResult};
use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// One row of the per-host state log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRow {
    pub host_id: String,
    pub state: HostState,
    /// Exact transition instant (ms), as reported by the engine.
    pub changed_at_ms: u64,
    /// Per-host monotonically increasing sequence number.
    pub seq: u64,
    pub is_active: bool,
}

/// One stored raw probe sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleRow {
    pub host_id: String,
    pub at_ms: u64,
    pub alive: bool,
    pub latency_ms: f64,
}

/// The boundary the live pipeline writes through. May be unavailable at
/// any time; callers degrade rather than fail.
pub trait DurableStore: Send + Sync {
    // Inventory.
    fn put_host(&self, host: &Host) -> StoreResult<()>;
    fn remove_host(&self, host_id: &str) -> StoreResult<bool>;
    fn list_hosts(&self, group: &str) -> StoreResult<Vec<Host>>;
    fn list_all_hosts(&self) -> StoreResult<Vec<Host>>;

    // Confirmed-state log (single active row per host).
    fn write_active_state(
        &self,
        host_id: &str,
        state: HostState,
        changed_at_ms: u64,
    ) -> StoreResult<()>;
    fn current_state(&self, host_id: &str) -> StoreResult<Option<StateRow>>;
    fn state_history(&self, host_id: &str) -> StoreResult<Vec<StateRow>>;
    fn current_outages(&self) -> StoreResult<Vec<StateRow>>;

    // Raw sample log.
    fn record_sample(&self, sample: &SampleRow) -> StoreResult<()>;
    fn read_samples(&self, host_id: &str, start_ms: u64, end_ms: u64)
    -> StoreResult<Vec<SampleRow>>;

    /// Trivial round-trip used by the DB health monitor.
    fn health_ping(&self) -> StoreResult<()>;
}

/// Thread-safe durable store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "durable store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory durable store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HOSTS).map_err(map_err!(Transaction))?;
        txn.open_table(STATE_LOG).map_err(map_err!(Transaction))?;
        txn.open_table(ACTIVE_STATE).map_err(map_err!(Transaction))?;
        txn.open_table(SAMPLES).map_err(map_err!(Transaction))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

fn state_log_key(host_id: &str, seq: u64) -> String {
    format!("{host_id}:{seq:020}")
}

fn sample_key(host_id: &str, at_ms: u64) -> String {
    format!("{host_id}:{at_ms:020}")
}

/// Exclusive upper bound for a `{host_id}:` prefix scan.
/// `;` is the successor of `:` in ASCII.
fn prefix_end(host_id: &str) -> String {
    format!("{host_id};")
}

/// Host ids become key prefixes delimited by ':'; an id containing one
/// would alias another host's range.
fn check_host_id(host_id: &str) -> StoreResult<()> {
    if host_id.contains(':') {
        return Err(StoreError::InvalidHostId(host_id.to_string()));
    }
    Ok(())
}

impl DurableStore for RedbStore {
    fn put_host(&self, host: &Host) -> StoreResult<()> {
        check_host_id(&host.id)?;
        let value = serde_json::to_vec(host).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Transaction))?;
            table
                .insert(host.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(host_id = %host.id, group = %host.group, "host stored");
        Ok(())
    }

    fn remove_host(&self, host_id: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Transaction))?;
            existed = table.remove(host_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    fn list_hosts(&self, group: &str) -> StoreResult<Vec<Host>> {
        Ok(self
            .list_all_hosts()?
            .into_iter()
            .filter(|h| h.group == group)
            .collect())
    }

    fn list_all_hosts(&self) -> StoreResult<Vec<Host>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Transaction))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let host: Host =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            results.push(host);
        }
        Ok(results)
    }

    fn write_active_state(
        &self,
        host_id: &str,
        state: HostState,
        changed_at_ms: u64,
    ) -> StoreResult<()> {
        check_host_id(host_id)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut applied = false;
        {
            let mut active = txn.open_table(ACTIVE_STATE).map_err(map_err!(Transaction))?;
            let mut log = txn.open_table(STATE_LOG).map_err(map_err!(Transaction))?;

            let prev: Option<StateRow> = match active.get(host_id).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice(guard.value()).map_err(map_err!(Decode))?,
                ),
                None => None,
            };

            // Repeated identical writes are harmless no-ops: the active
            // row already records this state.
            if !prev.as_ref().is_some_and(|p| p.state == state) {
                applied = true;
                let seq = match prev {
                    Some(mut old) => {
                        old.is_active = false;
                        let old_value = serde_json::to_vec(&old).map_err(map_err!(Encode))?;
                        log.insert(
                            state_log_key(host_id, old.seq).as_str(),
                            old_value.as_slice(),
                        )
                        .map_err(map_err!(Write))?;
                        old.seq + 1
                    }
                    None => 0,
                };

                let row = StateRow {
                    host_id: host_id.to_string(),
                    state,
                    changed_at_ms,
                    seq,
                    is_active: true,
                };
                let value = serde_json::to_vec(&row).map_err(map_err!(Encode))?;
                log.insert(state_log_key(host_id, seq).as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                active
                    .insert(host_id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if applied {
            debug!(%host_id, ?state, changed_at_ms, "active state written");
        }
        Ok(())
    }

    fn current_state(&self, host_id: &str) -> StoreResult<Option<StateRow>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIVE_STATE).map_err(map_err!(Transaction))?;
        match table.get(host_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let row: StateRow =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Decode))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn state_history(&self, host_id: &str) -> StoreResult<Vec<StateRow>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATE_LOG).map_err(map_err!(Transaction))?;
        let start = format!("{host_id}:");
        let end = prefix_end(host_id);
        let mut rows = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: StateRow =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn current_outages(&self) -> StoreResult<Vec<StateRow>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIVE_STATE).map_err(map_err!(Transaction))?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: StateRow =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            if row.state == HostState::Offline {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn record_sample(&self, sample: &SampleRow) -> StoreResult<()> {
        check_host_id(&sample.host_id)?;
        let value = serde_json::to_vec(sample).map_err(map_err!(Encode))?;
        let key = sample_key(&sample.host_id, sample.at_ms);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Transaction))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn read_samples(
        &self,
        host_id: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> StoreResult<Vec<SampleRow>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAMPLES).map_err(map_err!(Transaction))?;
        let start = sample_key(host_id, start_ms);
        let end = sample_key(host_id, end_ms.saturating_add(1));
        let mut rows = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: SampleRow =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn health_ping(&self) -> StoreResult<()> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        txn.open_table(HOSTS).map_err(map_err!(Transaction))?;
        Ok(())
    }
}
