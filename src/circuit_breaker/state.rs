//! Circuit breaker state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// The current state of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerState {
    /// Circuit is closed; calls pass through normally.
    Closed {
        /// Number of consecutive failures.
        failure_count: u32,
    },

    /// Circuit is open; calls are rejected.
    Open {
        /// When the circuit was opened (the time of the last failure).
        opened_at: Instant,
        /// When the circuit admits a trial call. `None` when the open
        /// duration does not fit in an [`Instant`]; the circuit then stays
        /// open until forced closed or reset.
        until: Option<Instant>,
        /// Failure count carried over from the state that tripped.
        failure_count: u32,
    },

    /// Circuit is half-open; trial calls are admitted.
    HalfOpen {
        /// Number of successful trials so far.
        success_count: u32,
        /// Number of trials currently running.
        in_flight: u32,
        /// Failure count carried over from the open state.
        failure_count: u32,
    },
}

impl BreakerState {
    /// Creates a new closed state.
    pub fn closed() -> Self {
        Self::Closed { failure_count: 0 }
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen { .. })
    }

    /// Returns the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        match self {
            Self::Closed { failure_count }
            | Self::Open { failure_count, .. }
            | Self::HalfOpen { failure_count, .. } => *failure_count,
        }
    }

    /// Returns the data-free kind of this state.
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Closed { .. } => StateKind::Closed,
            Self::Open { .. } => StateKind::Open,
            Self::HalfOpen { .. } => StateKind::HalfOpen,
        }
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::closed()
    }
}

/// The state of a breaker without its bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Calls pass through.
    Closed,
    /// Calls are rejected.
    Open,
    /// Trial calls are admitted.
    HalfOpen,
}

impl StateKind {
    /// Returns the snake_case name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Metrics about circuit breaker behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Total number of calls seen, including rejected ones.
    pub total_requests: u64,
    /// Number of successful calls.
    pub successful_requests: u64,
    /// Number of failed calls that counted towards tripping.
    pub failed_requests: u64,
    /// Number of failed calls the classifier chose not to count.
    pub ignored_errors: u64,
    /// Number of calls rejected without running.
    pub rejected_requests: u64,
    /// Number of times the circuit has opened.
    pub times_opened: u64,
    /// Number of times the circuit has closed again.
    pub times_closed: u64,
    /// Wall-clock time of the most recent counted failure.
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful call.
    pub fn record_success(&mut self) {
        self.total_requests += 1;
        self.successful_requests += 1;
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.last_failure_at = Some(Utc::now());
    }

    /// Records an error that did not count as a failure.
    pub fn record_ignored(&mut self) {
        self.total_requests += 1;
        self.ignored_errors += 1;
    }

    /// Records a rejected call.
    pub fn record_rejected(&mut self) {
        self.total_requests += 1;
        self.rejected_requests += 1;
    }

    /// Records that the circuit opened.
    pub fn record_opened(&mut self) {
        self.times_opened += 1;
    }

    /// Records that the circuit closed.
    pub fn record_closed(&mut self) {
        self.times_closed += 1;
    }

    /// Returns the success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// Returns the failure rate (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }
}
