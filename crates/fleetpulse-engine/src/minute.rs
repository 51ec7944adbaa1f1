//! Minute-window live classifier.
//!
//! Buckets the trailing `sequence_window_minutes + 1` minutes of raw
//! samples by minute, then scans the buckets in ascending order for the
//! first run of `consecutive_minutes_required` uniformly-OK or
//! uniformly-FAIL minutes. At each scan position OK is checked before
//! FAIL, and the scan stops at the first qualifying run of either kind.
//!
//! On a confirmed change the exact transition instant is recovered by
//! bisecting the raw samples for the last opposite-polarity sample
//! strictly before the run's first minute. That instant, not the
//! detection time, is what operators see as "when it actually went
//! down / came back".

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::policy::Sample;

/// Window geometry for the live classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MinuteWindow {
    /// Uniform minute-buckets required to confirm a state.
    pub consecutive_minutes_required: u32,
    /// The trailing window spans `sequence_window_minutes + 1` minutes.
    pub sequence_window_minutes: u32,
}

impl Default for MinuteWindow {
    fn default() -> Self {
        Self {
            consecutive_minutes_required: 5,
            sequence_window_minutes: 6,
        }
    }
}

/// Verdict for one minute bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinuteVerdict {
    /// Every sample in the minute succeeded.
    Ok,
    /// Every sample in the minute failed.
    Fail,
    /// The minute saw both polarities.
    Mix,
}

/// Outcome of one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Classification {
    /// A uniform-OK run confirmed the host is up.
    Up { since_ms: u64 },
    /// A uniform-FAIL run confirmed the host is down.
    Down { since_ms: u64 },
    /// No qualifying run; take no action, fire nothing.
    Unstable,
}

impl MinuteWindow {
    /// Trailing window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        (self.sequence_window_minutes as u64 + 1) * 60_000
    }

    /// Classify the trailing window of `samples` as of `now_ms`.
    ///
    /// `samples` need not be sorted; samples older than the window are
    /// ignored.
    pub fn classify(&self, samples: &[Sample], now_ms: u64) -> Classification {
        let window_start = now_ms.saturating_sub(self.window_ms());
        let mut window: Vec<Sample> = samples
            .iter()
            .copied()
            .filter(|s| s.at_ms >= window_start && s.at_ms <= now_ms)
            .collect();
        window.sort_by_key(|s| s.at_ms);

        let verdicts = minute_verdicts(&window);
        let need = self.consecutive_minutes_required as usize;
        if verdicts.len() < need {
            return Classification::Unstable;
        }

        for i in 0..=verdicts.len() - need {
            let run = &verdicts[i..i + need];
            let run_start_ms = run[0].0 * 60_000;
            // OK before FAIL: ties at the same position resolve to OK.
            if run.iter().all(|(_, v)| *v == MinuteVerdict::Ok) {
                let since = exact_transition_at(&window, run_start_ms, true);
                debug!(since_ms = since, "minute window confirmed UP");
                return Classification::Up { since_ms: since };
            }
            if run.iter().all(|(_, v)| *v == MinuteVerdict::Fail) {
                let since = exact_transition_at(&window, run_start_ms, false);
                debug!(since_ms = since, "minute window confirmed DOWN");
                return Classification::Down { since_ms: since };
            }
        }

        Classification::Unstable
    }
}

/// Bucket sorted samples by minute and judge each bucket.
fn minute_verdicts(sorted: &[Sample]) -> Vec<(u64, MinuteVerdict)> {
    let mut verdicts: Vec<(u64, MinuteVerdict)> = Vec::new();
    for s in sorted {
        let minute = s.at_ms / 60_000;
        let polarity = if s.success {
            MinuteVerdict::Ok
        } else {
            MinuteVerdict::Fail
        };
        match verdicts.last_mut() {
            Some((m, v)) if *m == minute => {
                if *v != polarity {
                    *v = MinuteVerdict::Mix;
                }
            }
            _ => verdicts.push((minute, polarity)),
        }
    }
    verdicts
}

/// Recover the exact transition instant for a confirmed state.
///
/// For a confirmed UP (`confirmed_up = true`) this is the last *failed*
/// sample strictly before the run's first minute; for a confirmed DOWN
/// it is the last *successful* one. Falls back to the run start when no
/// opposite sample exists in the window.
fn exact_transition_at(sorted: &[Sample], run_start_ms: u64, confirmed_up: bool) -> u64 {
    let before = sorted.partition_point(|s| s.at_ms < run_start_ms);
    sorted[..before]
        .iter()
        .rev()
        .find(|s| s.success == !confirmed_up)
        .map(|s| s.at_ms)
        .unwrap_or(run_start_ms)
}
