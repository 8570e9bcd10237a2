//! Circuit breaker implementation.
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! stopping traffic to a failing dependency and periodically probing it to
//! detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through.
//! - **Open**: Dependency is failing; calls are rejected immediately.
//! - **Half-Open**: Probing the dependency to see if it has recovered.
//!
//! ```text
//! Closed ──(failure_threshold consecutive failures)──▶ Open
//! Open ──(open_duration elapsed, next call)──▶ HalfOpen
//! HalfOpen ──(success_threshold successful trials)──▶ Closed
//! HalfOpen ──(any counted failure)──▶ Open
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use fusebox::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_open_duration(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new("search", config);
//! let hits = breaker.call(|| Ok::<u32, std::io::Error>(3));
//! assert_eq!(hits.unwrap(), 3);
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::CircuitBreaker;
pub use config::{CircuitBreakerConfig, ReopenPolicy};
pub use state::{BreakerMetrics, BreakerState, StateKind};
