//! Circuit breaker configuration.

use crate::core::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Number of successful trials in half-open state to close the circuit.
    pub success_threshold: u32,

    /// How long to keep the circuit open before admitting a trial call.
    pub open_duration: Duration,

    /// Maximum number of concurrent trial calls in half-open state.
    pub half_open_max_probes: u32,

    /// What happens to the failure count when a trial call fails.
    pub reopen_policy: ReopenPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            open_duration: Duration::from_secs(30),
            half_open_max_probes: 1,
            reopen_policy: ReopenPolicy::Preserve,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Sets the open duration.
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Sets the maximum number of half-open probes.
    pub fn with_half_open_max_probes(mut self, max: u32) -> Self {
        self.half_open_max_probes = max.max(1);
        self
    }

    /// Sets the reopen policy.
    pub fn with_reopen_policy(mut self, policy: ReopenPolicy) -> Self {
        self.reopen_policy = policy;
        self
    }

    /// Creates a configuration that trips early and recovers slowly.
    ///
    /// This configuration:
    /// - Uses a lower failure threshold (3)
    /// - Keeps circuits open longer (60 seconds)
    /// - Needs 3 successful trials to close
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 3,
            open_duration: Duration::from_secs(60),
            half_open_max_probes: 1,
            reopen_policy: ReopenPolicy::Preserve,
        }
    }

    /// Creates a configuration optimized for high availability.
    ///
    /// This configuration:
    /// - Uses a higher failure threshold (10)
    /// - Keeps circuits open for a shorter time (10 seconds)
    /// - Allows more probe attempts
    pub fn high_availability() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 2,
            open_duration: Duration::from_secs(10),
            half_open_max_probes: 3,
            reopen_policy: ReopenPolicy::Reset,
        }
    }

    /// Checks that every value is usable.
    ///
    /// The `with_*` builders already clamp counts to at least one; this
    /// catches configs assembled by hand or loaded from settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "success_threshold",
                "must be at least 1",
            ));
        }
        if self.half_open_max_probes == 0 {
            return Err(ConfigError::invalid(
                "half_open_max_probes",
                "must be at least 1",
            ));
        }
        if self.open_duration.is_zero() {
            return Err(ConfigError::invalid(
                "open_duration",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What the failure counter holds after a failed half-open trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReopenPolicy {
    /// Keep counting: the count carried into half-open plus the failed trial.
    #[default]
    Preserve,
    /// Start the next open period from zero.
    Reset,
}
