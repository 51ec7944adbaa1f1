//! Raw consecutive-run incident reconstructor.
//!
//! Replays an arbitrary span of stored samples and rebuilds the list of
//! confirmed outages, independent of minute bucketing. A DOWN fires the
//! instant the failing run reaches `fail_threshold` (exactly once per
//! maximal run); an UP fires the instant the succeeding run reaches
//! `recovery_threshold`, and the incident ends at the last observed
//! failure so downtime never includes the recovering probes.

use serde::{Deserialize, Serialize};

use fleetpulse_core::HostState;

use crate::policy::{DebouncePolicy, Sample};

/// How an incident relates to the queried range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Down and back up inside the range.
    Resolved,
    /// The failing run began inside the range and never recovered.
    OngoingStarted,
    /// The host was already down when the range began and never
    /// recovered within it.
    OngoingThroughout,
    /// Every sample in the range failed and there were enough of them
    /// to call it a real outage spanning the whole range.
    CompleteOutage,
    /// Every sample failed but there were too few to distinguish an
    /// outage from a monitoring gap.
    InsufficientData,
}

/// A reconstructed interval of confirmed downtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// First failing sample of the run that confirmed the outage.
    pub started_at_ms: u64,
    /// Last observed failure before recovery; None while ongoing.
    pub ended_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub status: IncidentStatus,
}

/// Inputs for one reconstruction pass.
#[derive(Debug, Clone, Copy)]
pub struct ReconstructOptions {
    pub policy: DebouncePolicy,
    /// All-failure ranges shorter than this report `InsufficientData`.
    pub min_samples: usize,
    /// Seeded state at the range start; `Offline` marks open incidents
    /// as `OngoingThroughout`.
    pub initial_state: HostState,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            policy: DebouncePolicy::default(),
            min_samples: 20,
            initial_state: HostState::Online,
        }
    }
}

/// Rebuild the ordered incident list for a span of raw samples.
pub fn reconstruct(samples: &[Sample], opts: &ReconstructOptions) -> Vec<Incident> {
    let mut events = samples.to_vec();
    events.sort_by_key(|s| s.at_ms);

    let Some(first) = events.first().copied() else {
        return Vec::new();
    };
    let last = *events.last().unwrap_or(&first);

    // Degenerate all-failure range: either a full outage or too little
    // signal to tell an outage from a monitoring gap.
    if events.iter().all(|s| !s.success) {
        let status = if events.len() < opts.min_samples {
            IncidentStatus::InsufficientData
        } else {
            IncidentStatus::CompleteOutage
        };
        return vec![Incident {
            started_at_ms: first.at_ms,
            ended_at_ms: Some(last.at_ms),
            duration_ms: Some(last.at_ms - first.at_ms),
            status,
        }];
    }

    let mut incidents = Vec::new();
    let mut state = opts.initial_state;
    let mut open: Option<(u64, IncidentStatus)> = if state == HostState::Offline {
        Some((first.at_ms, IncidentStatus::OngoingThroughout))
    } else {
        None
    };

    let mut fail_run: u32 = 0;
    let mut success_run: u32 = 0;
    let mut run_first_fail: u64 = 0;
    let mut last_fail_at: Option<u64> = None;

    for s in &events {
        if !s.success {
            if fail_run == 0 {
                run_first_fail = s.at_ms;
            }
            fail_run += 1;
            success_run = 0;
            last_fail_at = Some(s.at_ms);

            // Fires on equality only: once per maximal failing run.
            if fail_run == opts.policy.fail_threshold && state == HostState::Online {
                state = HostState::Offline;
                open = Some((run_first_fail, IncidentStatus::OngoingStarted));
            }
        } else {
            success_run += 1;
            fail_run = 0;

            if success_run == opts.policy.recovery_threshold && state == HostState::Offline {
                state = HostState::Online;
                if let Some((started_at_ms, _)) = open.take() {
                    // Downtime ends at the last observed failure, not
                    // at the recovering probe.
                    let ended = last_fail_at.unwrap_or(started_at_ms);
                    incidents.push(Incident {
                        started_at_ms,
                        ended_at_ms: Some(ended),
                        duration_ms: Some(ended.saturating_sub(started_at_ms)),
                        status: IncidentStatus::Resolved,
                    });
                }
            }
        }
    }

    if let Some((started_at_ms, status)) = open {
        incidents.push(Incident {
            started_at_ms,
            ended_at_ms: None,
            duration_ms: None,
            status,
        });
    }

    incidents
}

/// The single trailing run at the end of a sample span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingRun {
    /// Polarity of the run mapped to a state.
    pub state: HostState,
    /// Run length in samples.
    pub length: u32,
    /// Timestamp of the run's earliest sample.
    pub since_ms: u64,
    /// Whether the run already meets the relevant threshold, so a state
    /// flip may apply immediately without waiting for a new sample.
    pub confirmed: bool,
}

/// Scan the most recent samples backwards, accumulating one trailing
/// run and stopping at the first sample that breaks it.
pub fn current_host_state(samples: &[Sample], policy: &DebouncePolicy) -> Option<TrailingRun> {
    let mut events = samples.to_vec();
    events.sort_by_key(|s| s.at_ms);

    let last = events.last()?;
    let polarity = last.success;
    let mut length = 0u32;
    let mut since_ms = last.at_ms;
    for s in events.iter().rev() {
        if s.success != polarity {
            break;
        }
        length += 1;
        since_ms = s.at_ms;
    }

    let threshold = if polarity {
        policy.recovery_threshold
    } else {
        policy.fail_threshold
    };

    Some(TrailingRun {
        state: HostState::from_success(polarity),
        length,
        since_ms,
        confirmed: length >= threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(pattern: &[u8]) -> Vec<Sample> {
        pattern
            .iter()
            .enumerate()
            .map(|(i, &ok)| Sample {
                at_ms: i as u64 * 1000,
                success: ok == 1,
            })
            .collect()
    }

    fn opts(fail: u32, recovery: u32) -> ReconstructOptions {
        ReconstructOptions {
            policy: DebouncePolicy {
                fail_threshold: fail,
                recovery_threshold: recovery,
            },
            min_samples: 20,
            initial_state: HostState::Online,
        }
    }

    #[test]
    fn empty_span_yields_nothing() {
        assert!(reconstruct(&[], &opts(3, 3)).is_empty());
    }

    #[test]
    fn single_incident_with_exact_bounds() {
        // Failing run at indices 2..=7, recovery confirmed at index 10.
        let samples = seq(&[1, 1, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 1);
        let inc = &incidents[0];
        assert_eq!(inc.status, IncidentStatus::Resolved);
        assert_eq!(inc.started_at_ms, 2000);
        assert_eq!(inc.ended_at_ms, Some(7000));
        assert_eq!(inc.duration_ms, Some(5000));
    }

    #[test]
    fn one_down_per_maximal_run_regardless_of_length() {
        // 30 consecutive failures well past the threshold.
        let mut pattern = vec![1u8, 1];
        pattern.extend(std::iter::repeat_n(0u8, 30));
        pattern.extend([1, 1, 1]);
        let incidents = reconstruct(&seq(&pattern), &opts(3, 3));
        assert_eq!(incidents.len(), 1);
    }

    #[test]
    fn flapping_below_threshold_yields_no_incident() {
        let samples = seq(&[0, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0]);
        let incidents = reconstruct(&samples, &opts(5, 5));
        assert!(incidents.is_empty());
    }

    #[test]
    fn downtime_end_is_last_failure_not_recovery() {
        let samples = seq(&[0, 0, 0, 1, 1, 1]);
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 1);
        // Ends at the failure at t=2000, not the recovery at t=5000.
        assert_eq!(incidents[0].ended_at_ms, Some(2000));
    }

    #[test]
    fn short_all_failure_range_is_insufficient_data() {
        let samples = seq(&[0; 10]);
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::InsufficientData);
    }

    #[test]
    fn long_all_failure_range_is_complete_outage() {
        let samples = seq(&[0; 25]);
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 1);
        let inc = &incidents[0];
        assert_eq!(inc.status, IncidentStatus::CompleteOutage);
        assert_eq!(inc.started_at_ms, 0);
        assert_eq!(inc.ended_at_ms, Some(24_000));
    }

    #[test]
    fn unrecovered_run_reports_ongoing_started() {
        let samples = seq(&[1, 1, 1, 0, 0, 0, 0]);
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::OngoingStarted);
        assert_eq!(incidents[0].started_at_ms, 3000);
        assert_eq!(incidents[0].ended_at_ms, None);
    }

    #[test]
    fn seeded_offline_reports_ongoing_throughout() {
        let mut o = opts(3, 3);
        o.initial_state = HostState::Offline;
        // A couple of stray successes, never enough to recover.
        let samples = seq(&[0, 1, 0, 0, 1, 0, 0]);
        let incidents = reconstruct(&samples, &o);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::OngoingThroughout);
        assert_eq!(incidents[0].started_at_ms, 0);
    }

    #[test]
    fn seeded_offline_recovery_resolves() {
        let mut o = opts(3, 3);
        o.initial_state = HostState::Offline;
        let samples = seq(&[0, 0, 1, 1, 1, 1]);
        let incidents = reconstruct(&samples, &o);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::Resolved);
        assert_eq!(incidents[0].ended_at_ms, Some(1000));
    }

    #[test]
    fn two_separate_outages() {
        let samples = seq(&[0, 0, 0, 1, 1, 1, 0, 0, 0, 1, 1, 1]);
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].started_at_ms, 0);
        assert_eq!(incidents[0].ended_at_ms, Some(2000));
        assert_eq!(incidents[1].started_at_ms, 6000);
        assert_eq!(incidents[1].ended_at_ms, Some(8000));
    }

    #[test]
    fn unsorted_events_are_normalized() {
        let mut samples = seq(&[1, 1, 0, 0, 0, 1, 1, 1]);
        samples.reverse();
        let incidents = reconstruct(&samples, &opts(3, 3));
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].started_at_ms, 2000);
    }

    // ── current_host_state ─────────────────────────────────────

    #[test]
    fn no_samples_no_trailing_run() {
        let policy = DebouncePolicy::default();
        assert_eq!(current_host_state(&[], &policy), None);
    }

    #[test]
    fn trailing_fail_run_meets_threshold() {
        let policy = DebouncePolicy {
            fail_threshold: 3,
            recovery_threshold: 3,
        };
        let samples = seq(&[1, 1, 0, 0, 0, 0]);
        let run = current_host_state(&samples, &policy).unwrap();
        assert_eq!(run.state, HostState::Offline);
        assert_eq!(run.length, 4);
        assert_eq!(run.since_ms, 2000);
        assert!(run.confirmed);
    }

    #[test]
    fn trailing_run_below_threshold_unconfirmed() {
        let policy = DebouncePolicy {
            fail_threshold: 3,
            recovery_threshold: 3,
        };
        let samples = seq(&[0, 0, 0, 1, 1]);
        let run = current_host_state(&samples, &policy).unwrap();
        assert_eq!(run.state, HostState::Online);
        assert_eq!(run.length, 2);
        assert!(!run.confirmed);
    }

    #[test]
    fn trailing_run_stops_at_first_break() {
        let policy = DebouncePolicy {
            fail_threshold: 2,
            recovery_threshold: 2,
        };
        let samples = seq(&[0, 1, 0, 1, 1, 1]);
        let run = current_host_state(&samples, &policy).unwrap();
        assert_eq!(run.length, 3);
        assert_eq!(run.since_ms, 3000);
        assert!(run.confirmed);
    }
}
