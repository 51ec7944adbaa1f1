//! redb table definitions for the FleetPulse durable store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! domain types). Composite keys are `{host_id}:{zero-padded number}`
//! so range scans by host come out in key order.

use redb::TableDefinition;

/// Host inventory keyed by `{host_id}`.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Append-only state log keyed by `{host_id}:{seq:020}`.
pub const STATE_LOG: TableDefinition<&str, &[u8]> = TableDefinition::new("state_log");

/// Current active state row keyed by `{host_id}`.
pub const ACTIVE_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("active_state");

/// Raw probe samples keyed by `{host_id}:{at_ms:020}`.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");
