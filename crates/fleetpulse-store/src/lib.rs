//! fleetpulse-store — the durable side of FleetPulse.
//!
//! Provides the [`DurableStore`] boundary the rest of the system writes
//! through, its redb-backed implementation, the DB health monitor that
//! flips the process into degraded mode, and the write spool that
//! buffers confirmed transitions across store outages.

pub mod error;
pub mod health;
pub mod spool;
pub mod store;
pub mod tables;
pub mod testing;

pub use error::{StoreError, StoreResult};
pub use health::DbHealthMonitor;
pub use spool::{FlushOutcome, WriteSpool};
pub use store::{DurableStore, RedbStore, SampleRow, StateRow};
