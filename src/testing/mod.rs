//! Test doubles for exercising breakers.
//!
//! [`ScriptedService`] stands in for a flaky dependency: it plays back a
//! script of outcomes, then falls back to a default, and counts every
//! invocation so tests can assert that a rejected call never reached it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// The error produced by a [`ScriptedService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service failed: {message}")]
pub struct ServiceError {
    /// Description of the simulated failure.
    pub message: String,
}

impl ServiceError {
    /// Creates a new error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One scripted response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeds.
    Succeed,
    /// The call fails with the given message.
    Fail(String),
}

/// A fake dependency that replays scripted outcomes.
///
/// # Examples
///
/// ```rust
/// use fusebox::testing::ScriptedService;
///
/// let service = ScriptedService::new().then_fail(2).then_succeed(1);
///
/// assert!(service.call().is_err());
/// assert!(service.call().is_err());
/// assert_eq!(service.call().unwrap(), 3);
/// assert_eq!(service.calls(), 3);
/// ```
#[derive(Debug)]
pub struct ScriptedService {
    /// Outcomes still to be played back.
    script: RwLock<VecDeque<Outcome>>,
    /// Whether unscripted calls succeed.
    healthy: AtomicBool,
    /// Simulated latency for async calls.
    #[cfg_attr(not(feature = "tokio-runtime"), allow(dead_code))]
    latency: Option<Duration>,
    /// Counter for invocations.
    calls: AtomicU64,
}

impl ScriptedService {
    /// Creates a healthy service with an empty script.
    pub fn new() -> Self {
        Self {
            script: RwLock::new(VecDeque::new()),
            healthy: AtomicBool::new(true),
            latency: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Creates a service whose unscripted calls fail.
    pub fn failing() -> Self {
        let service = Self::new();
        service.set_healthy(false);
        service
    }

    /// Appends `n` successes to the script.
    pub fn then_succeed(self, n: usize) -> Self {
        self.push(Outcome::Succeed, n);
        self
    }

    /// Appends `n` failures to the script.
    pub fn then_fail(self, n: usize) -> Self {
        self.then_fail_with("scripted failure", n)
    }

    /// Appends `n` failures with a specific message to the script.
    pub fn then_fail_with(self, message: impl Into<String>, n: usize) -> Self {
        self.push(Outcome::Fail(message.into()), n);
        self
    }

    /// Sets the simulated latency for async calls.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sets whether unscripted calls succeed.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns the number of invocations so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Invokes the service.
    ///
    /// Returns the 1-based invocation number on success.
    pub fn call(&self) -> Result<u64, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self
            .script
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        let outcome = next.unwrap_or_else(|| {
            if self.healthy.load(Ordering::SeqCst) {
                Outcome::Succeed
            } else {
                Outcome::Fail("service unavailable".to_string())
            }
        });

        match outcome {
            Outcome::Succeed => Ok(n),
            Outcome::Fail(message) => Err(ServiceError::new(message)),
        }
    }

    /// Invokes the service asynchronously, honoring the configured latency.
    #[cfg(feature = "tokio-runtime")]
    pub async fn call_async(&self) -> Result<u64, ServiceError> {
        let result = self.call();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        result
    }

    fn push(&self, outcome: Outcome, n: usize) {
        let mut script = self
            .script
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        script.extend(std::iter::repeat(outcome).take(n));
    }
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self::new()
    }
}
