//! Transition event types and emission functions.

use crate::circuit_breaker::StateKind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A callback invoked after every state transition.
///
/// Listeners run after the breaker's lock has been released, so they may
/// call back into the breaker.
pub type TransitionListener = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

/// Event describing a single state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Unique event ID.
    pub id: Uuid,

    /// Name of the breaker that changed state.
    pub breaker: String,

    /// State before the transition.
    pub from: StateKind,

    /// State after the transition.
    pub to: StateKind,

    /// Failure count after the transition.
    pub failure_count: u32,

    /// Whether an operator forced the transition.
    pub forced: bool,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    /// Creates a new event stamped with the current time.
    pub fn new(
        breaker: impl Into<String>,
        from: StateKind,
        to: StateKind,
        failure_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            breaker: breaker.into(),
            from,
            to,
            failure_count,
            forced: false,
            timestamp: Utc::now(),
        }
    }

    /// Marks the event as operator-forced.
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// Returns `true` if the breaker tripped into the open state.
    pub fn is_trip(&self) -> bool {
        self.to == StateKind::Open && self.from != StateKind::Open
    }

    /// Returns `true` if the breaker recovered into the closed state.
    pub fn is_recovery(&self) -> bool {
        self.to == StateKind::Closed && self.from != StateKind::Closed
    }
}

/// Emits a tracing event for a state transition.
pub fn emit_transition(event: &TransitionEvent) {
    if event.to == StateKind::Open {
        tracing::warn!(
            target: "fusebox::events",
            event_type = "breaker_transition",
            event_id = %event.id,
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            failure_count = event.failure_count,
            forced = event.forced,
            "Circuit breaker opened"
        );
    } else {
        tracing::info!(
            target: "fusebox::events",
            event_type = "breaker_transition",
            event_id = %event.id,
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            failure_count = event.failure_count,
            forced = event.forced,
            "Circuit breaker state changed"
        );
    }
}

/// Emits a tracing event for a call rejected by an open breaker.
pub fn emit_rejected(breaker: &str, retry_after: Option<Duration>) {
    tracing::debug!(
        target: "fusebox::events",
        event_type = "breaker_rejected",
        breaker = %breaker,
        retry_after_ms = retry_after
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        "Call rejected by circuit breaker"
    );
}

/// Emits a tracing event for a counted failure.
pub fn emit_failure_recorded(breaker: &str, failure_count: u32, threshold: u32) {
    tracing::debug!(
        target: "fusebox::events",
        event_type = "breaker_failure",
        breaker = %breaker,
        failure_count = failure_count,
        threshold = threshold,
        "Failure recorded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_and_recovery_flags() {
        let trip = TransitionEvent::new("db", StateKind::Closed, StateKind::Open, 5);
        assert!(trip.is_trip());
        assert!(!trip.is_recovery());
        assert!(!trip.forced);

        let recovery = TransitionEvent::new("db", StateKind::HalfOpen, StateKind::Closed, 0);
        assert!(recovery.is_recovery());
        assert!(!recovery.is_trip());

        let probe = TransitionEvent::new("db", StateKind::Open, StateKind::HalfOpen, 5);
        assert!(!probe.is_trip());
        assert!(!probe.is_recovery());
    }

    #[test]
    fn test_event_serializes_with_snake_case_states() {
        let event = TransitionEvent::new("search", StateKind::Open, StateKind::HalfOpen, 3).forced();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["breaker"], "search");
        assert_eq!(json["from"], "open");
        assert_eq!(json["to"], "half_open");
        assert_eq!(json["failure_count"], 3);
        assert_eq!(json["forced"], true);
    }

    #[test]
    fn test_events_get_distinct_ids() {
        let a = TransitionEvent::new("x", StateKind::Closed, StateKind::Open, 1);
        let b = TransitionEvent::new("x", StateKind::Closed, StateKind::Open, 1);
        assert_ne!(a.id, b.id);
    }
}
