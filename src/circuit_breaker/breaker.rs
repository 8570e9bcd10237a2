//! Circuit breaker implementation.

use crate::circuit_breaker::config::{CircuitBreakerConfig, ReopenPolicy};
use crate::circuit_breaker::state::{BreakerMetrics, BreakerState, StateKind};
use crate::core::{BreakerError, BreakerResult, Clock, SystemClock};
use crate::events::{
    emit_failure_recorded, emit_rejected, emit_transition, TransitionEvent, TransitionListener,
};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// State and metrics, guarded together so that a count change, the
/// threshold check and the resulting transition are observed as one step.
#[derive(Debug, Default)]
struct BreakerCore {
    state: BreakerState,
    metrics: BreakerMetrics,
    /// Bumped on every change of state kind. Results reported against an
    /// older generation only touch the metrics.
    generation: u64,
}

impl BreakerCore {
    fn transition(&mut self, state: BreakerState) {
        self.state = state;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Returns `false` when `admission` was granted before the last transition.
    fn is_current(&self, admission: Option<Admission>) -> bool {
        admission.map_or(true, |a| a.generation == self.generation)
    }
}

/// What a call was admitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    generation: u64,
    probe: bool,
}

/// A thread-safe circuit breaker guarding calls to a failing dependency.
///
/// The circuit breaker counts consecutive failures and, once the threshold
/// is reached, rejects calls without running them until the open duration
/// has elapsed.
///
/// # States
///
/// - **Closed**: Normal operation. Calls pass through, failures are counted.
/// - **Open**: Dependency is failing. Calls are rejected immediately.
/// - **Half-Open**: Probing. A limited number of trial calls are allowed
///   through to test if the dependency has recovered.
///
/// The wrapped operation's error is always returned unchanged as
/// [`BreakerError::Inner`]; the breaker only adds [`BreakerError::Open`]
/// for calls it refuses.
///
/// # Example
///
/// ```rust
/// use fusebox::{CircuitBreaker, CircuitBreakerConfig};
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::default()
///     .with_failure_threshold(3)
///     .with_open_duration(Duration::from_secs(10));
/// let breaker = CircuitBreaker::new("inventory", config);
///
/// let result = breaker.call(|| Ok::<_, std::io::Error>(42));
/// assert_eq!(result.unwrap(), 42);
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    clock: C,
    core: RwLock<BreakerCore>,
    listeners: RwLock<Vec<TransitionListener>>,
}

impl CircuitBreaker<SystemClock> {
    /// Creates a new circuit breaker with the given name and configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, SystemClock)
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Creates a new circuit breaker that reads time from `clock`.
    pub fn with_clock(name: impl Into<String>, config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            core: RwLock::new(BreakerCore::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state of the circuit breaker.
    pub fn state(&self) -> BreakerState {
        self.core
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
            .clone()
    }

    /// Returns the current state without its bookkeeping.
    pub fn state_kind(&self) -> StateKind {
        self.core
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
            .kind()
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.core
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .metrics
            .clone()
    }

    /// Registers a listener called after every state transition.
    pub fn on_transition<F>(&self, listener: F)
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(listener));
    }

    /// Runs `operation` if the breaker admits it.
    ///
    /// Every error from `operation` counts as a failure.
    pub fn call<F, T, E>(&self, operation: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_classified(operation, |_| true)
    }

    /// Runs `operation` if the breaker admits it, counting only the errors
    /// for which `is_failure` returns `true`.
    ///
    /// Errors that are not counted are still returned to the caller.
    pub fn call_classified<F, P, T, E>(&self, operation: F, is_failure: P) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        P: FnOnce(&E) -> bool,
    {
        let permit = self.admit::<E>()?;
        match operation() {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                if is_failure(&e) {
                    permit.fail();
                } else {
                    permit.ignore();
                }
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Runs `operation` if the breaker admits it, or `fallback` if it does not.
    ///
    /// `fallback` receives the time left until the breaker admits a trial
    /// call, when known. Errors from `operation` propagate unchanged.
    pub fn call_or_else<F, G, T, E>(&self, operation: F, fallback: G) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        G: FnOnce(Option<Duration>) -> Result<T, E>,
    {
        match self.call(operation) {
            Ok(value) => Ok(value),
            Err(BreakerError::Inner(e)) => Err(e),
            Err(BreakerError::Open { retry_after, .. }) => fallback(retry_after),
        }
    }

    /// Awaits the future returned by `operation` if the breaker admits it.
    ///
    /// The breaker's lock is never held across the await. If the returned
    /// future is dropped before completing, a half-open probe slot taken by
    /// the call is released without counting a result.
    pub async fn call_async<F, Fut, T, E>(&self, operation: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_async_classified(operation, |_| true).await
    }

    /// Async form of [`call_classified`](Self::call_classified).
    pub async fn call_async_classified<F, Fut, P, T, E>(
        &self,
        operation: F,
        is_failure: P,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let permit = self.admit::<E>()?;
        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                if is_failure(&e) {
                    permit.fail();
                } else {
                    permit.ignore();
                }
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Asks for admission without running anything.
    ///
    /// For callers that cannot wrap their work in a closure. Every `Ok`
    /// must be followed by exactly one of [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or
    /// [`record_ignored`](Self::record_ignored).
    pub fn try_acquire(&self) -> Result<(), BreakerError<()>> {
        self.admit::<()>().map(Permit::detach)
    }

    /// Records a successful call admitted by [`try_acquire`](Self::try_acquire).
    ///
    /// The result is applied to whatever state the breaker is in now.
    pub fn record_success(&self) {
        self.settle_success(None);
    }

    /// Records a failed call admitted by [`try_acquire`](Self::try_acquire).
    pub fn record_failure(&self) {
        self.settle_failure(None);
    }

    /// Records an error that should not count either way.
    ///
    /// Releases a half-open probe slot, if the breaker is half-open.
    pub fn record_ignored(&self) {
        self.settle_ignored(None);
    }

    fn settle_success(&self, admission: Option<Admission>) {
        let event = {
            let mut core = self.lock_core();
            core.metrics.record_success();
            if !core.is_current(admission) {
                return;
            }

            match core.state {
                BreakerState::Closed { .. } => {
                    core.state = BreakerState::closed();
                    None
                }

                BreakerState::HalfOpen {
                    success_count,
                    in_flight,
                    failure_count,
                } => {
                    let new_success_count = success_count + 1;
                    if new_success_count >= self.config.success_threshold {
                        core.transition(BreakerState::closed());
                        core.metrics.record_closed();
                        Some(TransitionEvent::new(
                            &self.name,
                            StateKind::HalfOpen,
                            StateKind::Closed,
                            0,
                        ))
                    } else {
                        core.state = BreakerState::HalfOpen {
                            success_count: new_success_count,
                            in_flight: in_flight.saturating_sub(1),
                            failure_count,
                        };
                        None
                    }
                }

                // Reported through `record_success` after the circuit opened.
                BreakerState::Open { .. } => None,
            }
        };
        self.publish(event);
    }

    fn settle_failure(&self, admission: Option<Admission>) {
        let event = {
            let mut core = self.lock_core();
            core.metrics.record_failure();
            if !core.is_current(admission) {
                return;
            }
            let now = self.clock.now();

            match core.state {
                BreakerState::Closed { failure_count } => {
                    let new_count = failure_count.saturating_add(1);
                    emit_failure_recorded(&self.name, new_count, self.config.failure_threshold);

                    if new_count >= self.config.failure_threshold {
                        core.transition(self.open_state(now, new_count));
                        core.metrics.record_opened();
                        Some(TransitionEvent::new(
                            &self.name,
                            StateKind::Closed,
                            StateKind::Open,
                            new_count,
                        ))
                    } else {
                        core.state = BreakerState::Closed {
                            failure_count: new_count,
                        };
                        None
                    }
                }

                BreakerState::HalfOpen { failure_count, .. } => {
                    // Any counted failure during a trial reopens the circuit.
                    let new_count = match self.config.reopen_policy {
                        ReopenPolicy::Preserve => failure_count.saturating_add(1),
                        ReopenPolicy::Reset => 0,
                    };
                    core.transition(self.open_state(now, new_count));
                    core.metrics.record_opened();
                    Some(TransitionEvent::new(
                        &self.name,
                        StateKind::HalfOpen,
                        StateKind::Open,
                        new_count,
                    ))
                }

                BreakerState::Open {
                    opened_at,
                    until,
                    failure_count,
                } => {
                    core.state = BreakerState::Open {
                        opened_at,
                        until,
                        failure_count: failure_count.saturating_add(1),
                    };
                    None
                }
            }
        };
        self.publish(event);
    }

    fn settle_ignored(&self, admission: Option<Admission>) {
        let mut core = self.lock_core();
        core.metrics.record_ignored();
        Self::release_probe(&mut core, admission);
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        let event = {
            let mut core = self.lock_core();
            let now = self.clock.now();
            let from = core.state.kind();
            let failure_count = core.state.failure_count();
            core.transition(self.open_state(now, failure_count));
            core.metrics.record_opened();
            TransitionEvent::new(&self.name, from, StateKind::Open, failure_count).forced()
        };
        self.publish(Some(event));
    }

    /// Forces the circuit into the closed state.
    pub fn force_close(&self) {
        let event = {
            let mut core = self.lock_core();
            let from = core.state.kind();
            if from == StateKind::Closed {
                core.state = BreakerState::closed();
                None
            } else {
                core.transition(BreakerState::closed());
                core.metrics.record_closed();
                Some(TransitionEvent::new(&self.name, from, StateKind::Closed, 0).forced())
            }
        };
        self.publish(event);
    }

    /// Resets the circuit breaker state and metrics.
    pub fn reset(&self) {
        let event = {
            let mut core = self.lock_core();
            let from = core.state.kind();
            let generation = core.generation.wrapping_add(1);
            *core = BreakerCore {
                generation,
                ..BreakerCore::default()
            };
            (from != StateKind::Closed)
                .then(|| TransitionEvent::new(&self.name, from, StateKind::Closed, 0).forced())
        };
        self.publish(event);
    }

    /// Decides whether a call may run, moving open to half-open when due.
    fn admit<E>(&self) -> Result<Permit<'_, C>, BreakerError<E>> {
        let (result, event) = {
            let mut core = self.lock_core();
            let now = self.clock.now();

            let (result, event) = match core.state {
                BreakerState::Closed { .. } => (Ok(false), None),

                BreakerState::Open {
                    until,
                    failure_count,
                    ..
                } => match until {
                    Some(until) if now >= until => {
                        core.transition(BreakerState::HalfOpen {
                            success_count: 0,
                            in_flight: 1,
                            failure_count,
                        });
                        let event = TransitionEvent::new(
                            &self.name,
                            StateKind::Open,
                            StateKind::HalfOpen,
                            failure_count,
                        );
                        (Ok(true), Some(event))
                    }
                    _ => {
                        core.metrics.record_rejected();
                        (Err(until.map(|until| until - now)), None)
                    }
                },

                BreakerState::HalfOpen {
                    success_count,
                    in_flight,
                    failure_count,
                } => {
                    if in_flight < self.config.half_open_max_probes {
                        core.state = BreakerState::HalfOpen {
                            success_count,
                            in_flight: in_flight + 1,
                            failure_count,
                        };
                        (Ok(true), None)
                    } else {
                        core.metrics.record_rejected();
                        (Err(None), None)
                    }
                }
            };

            let generation = core.generation;
            let result = result.map(|probe| Admission { generation, probe });
            (result, event)
        };
        self.publish(event);

        match result {
            Ok(admission) => Ok(Permit {
                breaker: self,
                admission,
                armed: true,
            }),
            Err(retry_after) => {
                emit_rejected(&self.name, retry_after);
                Err(BreakerError::open(&self.name, retry_after))
            }
        }
    }

    /// Builds an open state starting at `now`.
    ///
    /// An open duration too large to represent as an instant leaves the
    /// circuit open until an operator closes or resets it.
    fn open_state(&self, now: Instant, failure_count: u32) -> BreakerState {
        BreakerState::Open {
            opened_at: now,
            until: now.checked_add(self.config.open_duration),
            failure_count,
        }
    }

    /// Gives back a half-open probe slot.
    ///
    /// With an admission, only a probe admitted by the current half-open
    /// period releases a slot.
    fn release_probe(core: &mut BreakerCore, admission: Option<Admission>) {
        if let Some(admission) = admission {
            if !admission.probe || !core.is_current(Some(admission)) {
                return;
            }
        }
        if let BreakerState::HalfOpen {
            success_count,
            in_flight,
            failure_count,
        } = core.state
        {
            core.state = BreakerState::HalfOpen {
                success_count,
                in_flight: in_flight.saturating_sub(1),
                failure_count,
            };
        }
    }

    fn lock_core(&self) -> RwLockWriteGuard<'_, BreakerCore> {
        self.core
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits and dispatches a transition. Must be called without the core lock held.
    fn publish(&self, event: Option<TransitionEvent>) {
        let Some(event) = event else {
            return;
        };
        emit_transition(&event);

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            listener(&event);
        }
    }
}

/// Admission for a single call.
///
/// Dropping an unresolved permit (a panic in the operation, or a cancelled
/// future) releases any probe slot without counting a result.
struct Permit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    admission: Admission,
    armed: bool,
}

impl<C: Clock> Permit<'_, C> {
    fn succeed(mut self) {
        self.armed = false;
        self.breaker.settle_success(Some(self.admission));
    }

    fn fail(mut self) {
        self.armed = false;
        self.breaker.settle_failure(Some(self.admission));
    }

    fn ignore(mut self) {
        self.armed = false;
        self.breaker.settle_ignored(Some(self.admission));
    }

    /// Hands result reporting over to the caller.
    fn detach(mut self) {
        self.armed = false;
    }
}

impl<C: Clock> Drop for Permit<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            let mut core = self.breaker.lock_core();
            CircuitBreaker::<C>::release_probe(&mut core, Some(self.admission));
        }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field(
                "state",
                &self
                    .core
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .state,
            )
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::testing::{ScriptedService, ServiceError};
    use std::sync::Mutex;

    fn breaker(threshold: u32, clock: &ManualClock) -> CircuitBreaker<ManualClock> {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(threshold)
            .with_open_duration(Duration::from_secs(30));
        CircuitBreaker::with_clock("test", config, clock.clone())
    }

    fn trip(breaker: &CircuitBreaker<ManualClock>, service: &ScriptedService) {
        for _ in 0..breaker.config().failure_threshold {
            let _ = breaker.call(|| service.call());
        }
        assert!(breaker.state().is_open());
    }

    #[test]
    fn test_circuit_breaker_passes_through() {
        let breaker = CircuitBreaker::with_defaults("svc");
        let service = ScriptedService::new();

        let result = breaker.call(|| service.call());

        assert_eq!(result.unwrap(), 1);
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().successful_requests, 1);
    }

    #[test]
    fn test_circuit_opens_on_threshold_and_rejects_next_call() {
        let clock = ManualClock::new();
        let breaker = breaker(3, &clock);
        let service = ScriptedService::failing();

        for _ in 0..3 {
            let result = breaker.call(|| service.call());
            assert!(matches!(result, Err(BreakerError::Inner(_))));
        }
        assert!(breaker.state().is_open());
        assert_eq!(breaker.state().failure_count(), 3);
        assert_eq!(breaker.metrics().times_opened, 1);

        let result = breaker.call(|| service.call());
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(service.calls(), 3);
    }

    #[test]
    fn test_inner_error_is_returned_unchanged() {
        let breaker = CircuitBreaker::with_defaults("svc");
        let service = ScriptedService::new().then_fail_with("boom", 1);

        let err = breaker.call(|| service.call()).unwrap_err();

        assert_eq!(err.into_inner(), Some(ServiceError::new("boom")));
    }

    #[test]
    fn test_open_rejects_until_timeout_without_invoking() {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock);
        let service = ScriptedService::failing();
        trip(&breaker, &service);
        let calls_at_trip = service.calls();

        for step in 1..=5u64 {
            clock.advance(Duration::from_secs(5));
            let err = breaker.call(|| service.call()).unwrap_err();
            assert!(err.is_rejected());
            assert_eq!(
                err.retry_after(),
                Some(Duration::from_secs(30 - 5 * step))
            );
        }

        assert_eq!(service.calls(), calls_at_trip);
        assert_eq!(breaker.metrics().rejected_requests, 5);
    }

    #[test]
    fn test_timeout_elapsed_invokes_trial_exactly_once() {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock);
        let service = ScriptedService::failing();
        trip(&breaker, &service);

        service.set_healthy(true);
        clock.advance(Duration::from_secs(30));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls_before = service.calls();
        let result = breaker.call(|| {
            seen.lock().unwrap().push(breaker.state_kind());
            service.call()
        });

        assert!(result.is_ok());
        assert_eq!(service.calls(), calls_before + 1);
        assert_eq!(*seen.lock().unwrap(), vec![StateKind::HalfOpen]);
    }

    #[test]
    fn test_successful_trial_closes_and_resets_count() {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock);
        let service = ScriptedService::failing();
        trip(&breaker, &service);

        service.set_healthy(true);
        clock.advance(Duration::from_secs(31));
        breaker.call(|| service.call()).unwrap();

        assert_eq!(breaker.state(), BreakerState::Closed { failure_count: 0 });
        assert_eq!(breaker.metrics().times_closed, 1);
    }

    #[test]
    fn test_failed_trial_reopens_and_preserves_count() {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock);
        let service = ScriptedService::failing();
        trip(&breaker, &service);

        clock.advance(Duration::from_secs(30));
        let result = breaker.call(|| service.call());

        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert!(breaker.state().is_open());
        assert_eq!(breaker.state().failure_count(), 3);
        assert_eq!(breaker.metrics().times_opened, 2);

        // The new open period starts at the failed trial.
        clock.advance(Duration::from_secs(29));
        let err = breaker.call(|| service.call()).unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_failed_trial_with_reset_policy_zeroes_count() {
        let clock = ManualClock::new();
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(2)
            .with_reopen_policy(ReopenPolicy::Reset);
        let breaker = CircuitBreaker::with_clock("test", config, clock.clone());
        let service = ScriptedService::failing();
        trip(&breaker, &service);

        clock.advance(Duration::from_secs(30));
        let _ = breaker.call(|| service.call());

        assert!(breaker.state().is_open());
        assert_eq!(breaker.state().failure_count(), 0);
    }

    #[test]
    fn test_repeated_success_stays_closed() {
        let breaker = CircuitBreaker::with_defaults("svc");
        let service = ScriptedService::new();
        let transitions = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&transitions);
        breaker.on_transition(move |_| *counter.lock().unwrap() += 1);

        for _ in 0..100 {
            breaker.call(|| service.call()).unwrap();
            assert!(breaker.state().is_closed());
        }

        assert_eq!(*transitions.lock().unwrap(), 0);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_failure_threshold(3),
        );
        let service = ScriptedService::new()
            .then_fail(2)
            .then_succeed(1)
            .then_fail(2);

        for _ in 0..5 {
            let _ = breaker.call(|| service.call());
        }

        assert_eq!(breaker.state(), BreakerState::Closed { failure_count: 2 });
    }

    #[test]
    fn test_half_open_probe_limit() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);
        breaker.force_open();
        clock.advance(Duration::from_secs(30));

        assert!(breaker.try_acquire().is_ok());
        assert!(breaker.state().is_half_open());

        let err = breaker.try_acquire().unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.retry_after(), None);

        breaker.record_success();
        assert!(breaker.state().is_closed());
    }

    #[test]
    fn test_success_threshold_requires_multiple_trials() {
        let clock = ManualClock::new();
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_success_threshold(2)
            .with_half_open_max_probes(2);
        let breaker = CircuitBreaker::with_clock("test", config, clock.clone());
        let service = ScriptedService::new();

        breaker.force_open();
        clock.advance(Duration::from_secs(30));

        breaker.call(|| service.call()).unwrap();
        assert!(breaker.state().is_half_open());

        breaker.call(|| service.call()).unwrap();
        assert!(breaker.state().is_closed());
    }

    #[test]
    fn test_classified_errors_do_not_trip() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_failure_threshold(2),
        );
        let service = ScriptedService::failing();

        for _ in 0..10 {
            let result = breaker.call_classified(|| service.call(), |_| false);
            assert!(matches!(result, Err(BreakerError::Inner(_))));
        }

        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().ignored_errors, 10);
        assert_eq!(breaker.metrics().failed_requests, 0);
    }

    #[test]
    fn test_ignored_error_releases_probe_slot() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);
        let service = ScriptedService::failing();
        breaker.force_open();
        clock.advance(Duration::from_secs(30));

        let _ = breaker.call_classified(|| service.call(), |_| false);

        assert!(breaker.state().is_half_open());
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_success_admitted_while_closed_does_not_close_half_open() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);

        let result = breaker.call(|| {
            let _ = breaker.call(|| Err::<(), _>(ServiceError::new("down")));
            assert!(breaker.state().is_open());
            clock.advance(Duration::from_secs(30));
            assert!(breaker.try_acquire().is_ok());
            Ok::<_, ServiceError>(())
        });

        assert!(result.is_ok());
        assert!(breaker.state().is_half_open());
        assert_eq!(breaker.metrics().successful_requests, 1);

        // The trial admitted above is still the only one running.
        assert!(breaker.try_acquire().unwrap_err().is_rejected());
        breaker.record_success();
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().times_closed, 1);
    }

    #[test]
    fn test_ignored_error_admitted_while_closed_keeps_probe_slot() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);

        let result = breaker.call_classified(
            || {
                let _ = breaker.call(|| Err::<(), _>(ServiceError::new("down")));
                clock.advance(Duration::from_secs(30));
                assert!(breaker.try_acquire().is_ok());
                Err::<(), _>(ServiceError::new("not found"))
            },
            |_| false,
        );

        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert_eq!(
            breaker.state(),
            BreakerState::HalfOpen {
                success_count: 0,
                in_flight: 1,
                failure_count: 1,
            }
        );
        assert!(breaker.try_acquire().unwrap_err().is_rejected());
    }

    #[test]
    fn test_failure_admitted_before_trip_only_updates_metrics() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);

        let result = breaker.call(|| {
            let _ = breaker.call(|| Err::<(), _>(ServiceError::new("down")));
            Err::<(), _>(ServiceError::new("down"))
        });

        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert!(breaker.state().is_open());
        assert_eq!(breaker.state().failure_count(), 1);
        assert_eq!(breaker.metrics().failed_requests, 2);
        assert_eq!(breaker.metrics().times_opened, 1);
    }

    #[test]
    fn test_success_after_force_open_keeps_circuit_open() {
        let breaker = CircuitBreaker::with_defaults("svc");

        let result = breaker.call(|| {
            breaker.force_open();
            Ok::<_, ServiceError>(())
        });

        assert!(result.is_ok());
        assert!(breaker.state().is_open());
    }

    #[test]
    fn test_unrepresentable_open_duration_stays_open() {
        let clock = ManualClock::new();
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_open_duration(Duration::MAX);
        assert!(config.validate().is_ok());
        let breaker = CircuitBreaker::with_clock("test", config, clock.clone());

        let result = breaker.call(|| Err::<(), _>(ServiceError::new("down")));
        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert!(matches!(breaker.state(), BreakerState::Open { until: None, .. }));

        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        let err = breaker.call(|| Ok::<_, ServiceError>(())).unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.retry_after(), None);

        breaker.force_open();
        breaker.force_close();
        assert!(breaker.call(|| Ok::<_, ServiceError>(())).is_ok());
    }

    #[test]
    fn test_call_or_else_uses_fallback_only_when_rejected() {
        let breaker = CircuitBreaker::with_defaults("svc");
        let service = ScriptedService::failing();

        let result = breaker.call_or_else(|| service.call(), |_| Ok(0));
        assert!(result.is_err());

        breaker.force_open();
        let result = breaker.call_or_else(
            || service.call(),
            |retry_after| {
                assert!(retry_after.is_some());
                Ok(0)
            },
        );
        assert_eq!(result.unwrap(), 0);
        assert_eq!(service.calls(), 1);
    }

    #[test]
    fn test_listeners_see_full_cycle() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);
        let service = ScriptedService::new().then_fail(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        breaker.on_transition(move |event| {
            sink.lock().unwrap().push((event.from, event.to));
        });

        let _ = breaker.call(|| service.call());
        clock.advance(Duration::from_secs(30));
        breaker.call(|| service.call()).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (StateKind::Closed, StateKind::Open),
                (StateKind::Open, StateKind::HalfOpen),
                (StateKind::HalfOpen, StateKind::Closed),
            ]
        );
    }

    #[test]
    fn test_listener_may_reenter_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_failure_threshold(1),
        ));
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let weak = Arc::downgrade(&breaker);
        breaker.on_transition(move |_| {
            if let Some(b) = weak.upgrade() {
                *sink.lock().unwrap() = Some(b.state_kind());
            }
        });

        let _ = breaker.call(|| Err::<(), _>("down"));

        assert_eq!(*observed.lock().unwrap(), Some(StateKind::Open));
    }

    #[test]
    fn test_force_open_close() {
        let breaker = CircuitBreaker::with_defaults("svc");

        assert!(breaker.state().is_closed());

        breaker.force_open();
        assert!(breaker.state().is_open());

        breaker.force_close();
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().times_closed, 1);
    }

    #[test]
    fn test_reset_clears_metrics() {
        let breaker = CircuitBreaker::with_defaults("svc");
        breaker.force_open();
        let _ = breaker.call(|| Ok::<_, ServiceError>(()));

        breaker.reset();

        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics(), BreakerMetrics::default());
    }

    #[test]
    fn test_concurrent_failures_trip_once() {
        let breaker = Arc::new(CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_failure_threshold(5),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || {
                    let _ = breaker.call(|| Err::<(), _>(ServiceError::new("down")));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = breaker.metrics();
        assert!(breaker.state().is_open());
        assert_eq!(metrics.times_opened, 1);
        assert_eq!(metrics.failed_requests + metrics.rejected_requests, 16);
        assert!(metrics.failed_requests >= 5);
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_call_async_trips_and_recovers() {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock);
        let service = ScriptedService::failing();

        for _ in 0..2 {
            let result = breaker.call_async(|| service.call_async()).await;
            assert!(matches!(result, Err(BreakerError::Inner(_))));
        }
        assert!(breaker.state().is_open());

        let result = breaker.call_async(|| service.call_async()).await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));

        service.set_healthy(true);
        clock.advance(Duration::from_secs(30));
        let result = breaker.call_async(|| service.call_async()).await;
        assert!(result.is_ok());
        assert!(breaker.state().is_closed());
    }

    #[tokio::test]
    async fn test_cancelled_trial_releases_probe_slot() {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock);
        breaker.force_open();
        clock.advance(Duration::from_secs(30));

        let stalled = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call_async(|| std::future::pending::<Result<(), ServiceError>>()),
        )
        .await;
        assert!(stalled.is_err());

        assert!(breaker.state().is_half_open());
        assert!(breaker.try_acquire().is_ok());
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_concurrent_async_trials_respect_probe_limit() {
        let clock = ManualClock::new();
        let breaker = Arc::new(breaker(1, &clock));
        let service = Arc::new(ScriptedService::new().with_latency(Duration::from_millis(20)));
        breaker.force_open();
        clock.advance(Duration::from_secs(30));

        let calls = (0..4).map(|_| {
            let breaker = Arc::clone(&breaker);
            let service = Arc::clone(&service);
            async move { breaker.call_async(|| service.call_async()).await }
        });
        let results = futures::future::join_all(calls).await;

        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_rejected()))
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(rejected, 3);
        assert_eq!(service.calls(), 1);
        assert!(breaker.state().is_closed());
    }
}
