//! fleetpulse-probe — produces raw reachability samples per host group.
//!
//! A [`Prober`] runs one fixed-interval loop per group: refresh the
//! inventory (reusing the last good copy when the store is down), issue
//! one batched ping sweep for the whole group, merge every result into
//! the live state store, and run the minute-window classifier to decide
//! whether a confirmed transition should notify and persist.

pub mod pinger;
pub mod prober;

pub use pinger::{FpingPinger, PingError, Pinger, parse_fping_line};
pub use prober::{LogNotifier, Notifier, Prober, ProberSettings};
