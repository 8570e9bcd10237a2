//! # Fusebox
//!
//! A thread-safe circuit breaker for guarding calls to unreliable
//! dependencies, with sync and async entry points, named registries,
//! file-based settings, and structured transition events.
//!
//! ## Overview
//!
//! A breaker wraps a zero-argument operation. While the dependency is
//! healthy, calls pass straight through. After a run of consecutive
//! failures the breaker opens and rejects calls without running them;
//! once the open duration has elapsed it lets a trial call through and
//! closes again if the trial succeeds.
//!
//! The wrapped operation's own error is never swallowed or replaced: it
//! comes back as [`BreakerError::Inner`]. The only error the breaker adds is
//! [`BreakerError::Open`], for calls it refused.
//!
//! ## Quick Start
//!
//! ```rust
//! use fusebox::prelude::*;
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     "billing",
//!     CircuitBreakerConfig::default()
//!         .with_failure_threshold(2)
//!         .with_open_duration(Duration::from_secs(30)),
//! );
//!
//! for _ in 0..2 {
//!     let result = breaker.call(|| Err::<(), _>("connection refused"));
//!     assert!(matches!(result, Err(BreakerError::Inner("connection refused"))));
//! }
//!
//! // Tripped: the operation is no longer invoked.
//! let result = breaker.call(|| -> Result<(), &'static str> { unreachable!() });
//! assert!(result.unwrap_err().is_rejected());
//! ```
//!
//! ## Features
//!
//! - `default` - Includes tokio runtime support
//! - `tokio-runtime` - Async retry helpers via tokio
//!
//! ## Architecture
//!
//! - **Core**: Error types and time sources
//! - **Circuit Breaker**: State machine, configuration, guarded calls
//! - **Events**: Structured transition events and listeners
//! - **Registry**: One shared breaker per dependency name
//! - **Settings**: TOML-backed configuration
//! - **Retry**: Backoff-based retries that stop on rejection
//! - **Testing**: Scripted fake dependency

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod circuit_breaker;
pub mod core;
pub mod events;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod testing;

// Re-export commonly used types at the crate root
pub use crate::core::{BreakerError, BreakerResult, Clock, ConfigError, ManualClock, SystemClock};

pub use crate::circuit_breaker::{
    BreakerMetrics, BreakerState, CircuitBreaker, CircuitBreakerConfig, ReopenPolicy, StateKind,
};
pub use crate::events::TransitionEvent;
pub use crate::registry::{BreakerRegistry, BreakerSnapshot};
pub use crate::retry::RetryConfig;
pub use crate::settings::{BreakerSettings, RegistrySettings};

/// Prelude module for convenient imports.
///
/// ```rust
/// use fusebox::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{
        BreakerState, CircuitBreaker, CircuitBreakerConfig, ReopenPolicy, StateKind,
    };
    pub use crate::core::{BreakerError, BreakerResult};
    pub use crate::events::TransitionEvent;
    pub use crate::registry::BreakerRegistry;
    pub use crate::retry::RetryConfig;
}
