//! Error types for the fusebox library.
//!
//! A guarded call can fail in exactly two ways: the breaker refuses to run
//! the operation, or the operation runs and fails on its own. The second
//! case always carries the caller's error untouched.

use std::time::Duration;
use thiserror::Error;

/// The error returned by a guarded call.
///
/// `E` is the error type of the wrapped operation. The breaker never
/// replaces or wraps that error in anything other than [`BreakerError::Inner`],
/// so callers can always recover it with [`BreakerError::into_inner`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without invoking the operation.
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Name of the breaker that rejected the call.
        name: String,
        /// Time left until the breaker admits a trial call, if known.
        ///
        /// `None` when the rejection came from the half-open probe limit
        /// rather than from the open timeout.
        retry_after: Option<Duration>,
    },

    /// The wrapped operation failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Creates an `Open` rejection.
    pub fn open(name: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Open {
            name: name.into(),
            retry_after,
        }
    }

    /// Returns `true` if the breaker rejected the call.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns the wrapped operation's error, if there is one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }

    /// Consumes the error and returns the wrapped operation's error.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }

    /// Returns the breaker name for rejections.
    pub fn breaker_name(&self) -> Option<&str> {
        match self {
            Self::Open { name, .. } => Some(name),
            Self::Inner(_) => None,
        }
    }

    /// Returns the suggested wait before retrying, for rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Open { retry_after, .. } => *retry_after,
            Self::Inner(_) => None,
        }
    }

    /// Maps the inner error, leaving rejections untouched.
    pub fn map_inner<F, U>(self, f: F) -> BreakerError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Open { name, retry_after } => BreakerError::Open { name, retry_after },
            Self::Inner(e) => BreakerError::Inner(f(e)),
        }
    }
}

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The settings document could not be parsed.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an `InvalidValue` error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for guarded calls.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// A specialized `Result` type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
