//! Core types for the fusebox library.
//!
//! - [`error`] - The guarded-call error and configuration errors
//! - [`clock`] - Time sources used by breakers

pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BreakerError, BreakerResult, ConfigError, ConfigResult};
