//! fleetpulse-live — the authoritative in-memory view of the fleet.
//!
//! One [`LiveStateStore`] per process holds per-group host state,
//! detects raw polarity flips, keeps a bounded ring of recent
//! transitions, computes group summaries, and fans updates out to
//! subscribers over a broadcast channel. Updates are short critical
//! sections that never wait on network or storage I/O; slow stream
//! consumers only lag their own receiver, never ingestion.

pub mod feed;
pub mod store;

pub use feed::FeedEvent;
pub use store::{FleetSnapshot, GroupSnapshot, HostSnapshot, LiveStateStore};
