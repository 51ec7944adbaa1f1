//! Debounce policy shared by both engine adapters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a policy cannot be used.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("fail_threshold must be positive")]
    ZeroFailThreshold,

    #[error("recovery_threshold must be positive")]
    ZeroRecoveryThreshold,
}

/// Minimum consecutive same-direction samples required to confirm a
/// state change in either direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Consecutive failures before DOWN is confirmed.
    pub fail_threshold: u32,
    /// Consecutive successes before UP is confirmed.
    pub recovery_threshold: u32,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            fail_threshold: 10,
            recovery_threshold: 10,
        }
    }
}

impl DebouncePolicy {
    pub fn new(fail_threshold: u32, recovery_threshold: u32) -> Result<Self, PolicyError> {
        let policy = Self {
            fail_threshold,
            recovery_threshold,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.fail_threshold == 0 {
            return Err(PolicyError::ZeroFailThreshold);
        }
        if self.recovery_threshold == 0 {
            return Err(PolicyError::ZeroRecoveryThreshold);
        }
        Ok(())
    }
}

/// One raw reachability observation, the input unit of both adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Unix timestamp in milliseconds.
    pub at_ms: u64,
    pub success: bool,
}

impl Sample {
    pub fn up(at_ms: u64) -> Self {
        Self {
            at_ms,
            success: true,
        }
    }

    pub fn down(at_ms: u64) -> Self {
        Self {
            at_ms,
            success: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_policy_accepted() {
        DebouncePolicy::new(10, 10).unwrap();
        DebouncePolicy::new(1, 1).unwrap();
    }

    #[test]
    fn zero_thresholds_rejected() {
        assert!(DebouncePolicy::new(0, 10).is_err());
        assert!(DebouncePolicy::new(10, 0).is_err());
    }

    #[test]
    fn default_matches_operational_baseline() {
        let policy = DebouncePolicy::default();
        assert_eq!(policy.fail_threshold, 10);
        assert_eq!(policy.recovery_threshold, 10);
    }
}
