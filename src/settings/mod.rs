//! File-based breaker settings.
//!
//! Settings are plain serde structs that deserialize from TOML and convert
//! into validated [`CircuitBreakerConfig`] values. Missing fields take the
//! library defaults.
//!
//! ```toml
//! [defaults]
//! failure_threshold = 5
//! open_duration_ms = 30000
//!
//! [breakers.payments]
//! failure_threshold = 3
//! reopen_policy = "reset"
//! ```

use crate::circuit_breaker::{CircuitBreakerConfig, ReopenPolicy};
use crate::core::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Serializable form of [`CircuitBreakerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Successful trials needed to close.
    pub success_threshold: u32,
    /// Open period in milliseconds.
    pub open_duration_ms: u64,
    /// Concurrent trials allowed while half-open.
    pub half_open_max_probes: u32,
    /// Failure count handling after a failed trial.
    pub reopen_policy: ReopenPolicy,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        CircuitBreakerConfig::default().into()
    }
}

impl BreakerSettings {
    /// Parses settings from a TOML string.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads settings from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Converts into a validated configuration.
    pub fn into_config(self) -> ConfigResult<CircuitBreakerConfig> {
        self.try_into()
    }
}

impl From<CircuitBreakerConfig> for BreakerSettings {
    fn from(config: CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            open_duration_ms: u64::try_from(config.open_duration.as_millis())
                .unwrap_or(u64::MAX),
            half_open_max_probes: config.half_open_max_probes,
            reopen_policy: config.reopen_policy,
        }
    }
}

impl TryFrom<BreakerSettings> for CircuitBreakerConfig {
    type Error = ConfigError;

    fn try_from(settings: BreakerSettings) -> Result<Self, Self::Error> {
        let config = CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            success_threshold: settings.success_threshold,
            open_duration: Duration::from_millis(settings.open_duration_ms),
            half_open_max_probes: settings.half_open_max_probes,
            reopen_policy: settings.reopen_policy,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings for a whole [`BreakerRegistry`](crate::registry::BreakerRegistry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    /// Settings for breakers without an entry in `breakers`.
    pub defaults: BreakerSettings,
    /// Per-breaker overrides, keyed by breaker name.
    ///
    /// Each override is a complete block: fields it leaves out take the
    /// library defaults, not the values under `defaults`.
    pub breakers: HashMap<String, BreakerSettings>,
}

impl RegistrySettings {
    /// Parses registry settings from a TOML string.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads registry settings from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
