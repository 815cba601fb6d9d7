//! Failure governor.
//!
//! Tracks consecutive failed cycles. The loop stays `Healthy` while the
//! count is at or below the threshold; one more failure moves it to the
//! terminal `Aborted` state. A successful cycle resets the count and the
//! backoff.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorState {
    Healthy,
    Aborted,
}

/// How the inter-cycle sleep reacts to failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Always sleep the configured interval.
    #[default]
    Fixed,
    /// Double the sleep per consecutive failure, up to `max`.
    Exponential { max: Duration },
}

#[derive(Debug)]
pub struct FailureGovernor {
    state: GovernorState,
    consecutive_failures: u32,
    threshold: u32,
    policy: BackoffPolicy,
    base_interval: Duration,
    current_interval: Duration,
}

impl FailureGovernor {
    pub const DEFAULT_THRESHOLD: u32 = 5;

    pub fn new(threshold: u32, base_interval: Duration, policy: BackoffPolicy) -> Self {
        Self {
            state: GovernorState::Healthy,
            consecutive_failures: 0,
            threshold,
            policy,
            base_interval,
            current_interval: base_interval,
        }
    }

    pub fn record_success(&mut self) -> GovernorState {
        if self.state == GovernorState::Aborted {
            return self.state;
        }
        if self.consecutive_failures > 0 {
            debug!(
                failures = self.consecutive_failures,
                "cycle succeeded, failure count reset"
            );
        }
        self.consecutive_failures = 0;
        self.current_interval = self.base_interval;
        self.state
    }

    pub fn record_failure(&mut self) -> GovernorState {
        if self.state == GovernorState::Aborted {
            return self.state;
        }
        self.consecutive_failures += 1;

        if let BackoffPolicy::Exponential { max } = self.policy {
            self.current_interval = self.current_interval.saturating_mul(2).min(max);
        }

        if self.consecutive_failures > self.threshold {
            error!(
                failures = self.consecutive_failures,
                threshold = self.threshold,
                "too many consecutive failures"
            );
            self.state = GovernorState::Aborted;
        } else {
            warn!(
                failures = self.consecutive_failures,
                threshold = self.threshold,
                next_interval_secs = self.current_interval.as_secs(),
                "cycle failed"
            );
        }
        self.state
    }

    pub fn state(&self) -> GovernorState {
        self.state
    }

    pub fn is_aborted(&self) -> bool {
        self.state == GovernorState::Aborted
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Sleep before the next cycle.
    pub fn next_interval(&self) -> Duration {
        self.current_interval
    }
}
