//! fleetpulse-engine — turns noisy reachability samples into confirmed
//! state transitions.
//!
//! One debounce policy, two input adapters:
//!
//! - [`minute`]: the live classifier. Buckets the trailing window by
//!   minute and looks for a run of uniformly-OK or uniformly-FAIL
//!   minutes; used to decide whether to fire a notification *now*.
//! - [`raw`]: the incident reconstructor. Replays an arbitrary span of
//!   stored samples with consecutive-run counters; used to rebuild
//!   historical outage lists and to answer "is this host down right
//!   now" from the trailing run.
//!
//! Both adapters share [`DebouncePolicy`] and [`Sample`], so the notion
//! of "confirmed transition" cannot drift between live alerting and
//! historical reporting.

pub mod minute;
pub mod policy;
pub mod raw;

pub use minute::{Classification, MinuteVerdict, MinuteWindow};
pub use policy::{DebouncePolicy, PolicyError, Sample};
pub use raw::{Incident, IncidentStatus, ReconstructOptions, TrailingRun, current_host_state, reconstruct};
