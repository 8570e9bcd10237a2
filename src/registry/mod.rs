//! Named breakers.
//!
//! A [`BreakerRegistry`] hands out one shared breaker per dependency name,
//! creating it on first use from the registry's default configuration or
//! a per-name override.

use crate::circuit_breaker::{BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, StateKind};
use crate::core::ConfigResult;
use crate::settings::RegistrySettings;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: StateKind,
    /// Consecutive failure count.
    pub failure_count: u32,
    /// Accumulated metrics.
    pub metrics: BreakerMetrics,
}

/// A set of breakers keyed by name.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates a registry whose breakers use `defaults`.
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a registry from validated settings.
    pub fn from_settings(settings: RegistrySettings) -> ConfigResult<Self> {
        let mut registry = Self::new(settings.defaults.into_config()?);
        for (name, breaker) in settings.breakers {
            registry.overrides.insert(name, breaker.into_config()?);
        }
        Ok(registry)
    }

    /// Sets the configuration used when `name` is first created.
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Returns the configuration a breaker called `name` would get.
    pub fn config_for(&self, name: &str) -> &CircuitBreakerConfig {
        self.overrides.get(name).unwrap_or(&self.defaults)
    }

    /// Returns the breaker for `name`, creating it if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(name) {
            return breaker;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another caller may have created it between the read and the write.
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(breaker = %name, "Creating circuit breaker");
            Arc::new(CircuitBreaker::new(name, self.config_for(name).clone()))
        }))
    }

    /// Returns the breaker for `name` if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Replaces the breaker for `name` with a fresh one using `config`.
    pub fn insert(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        self.breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Returns the names of all created breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns a snapshot of every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        let mut snapshots: Vec<BreakerSnapshot> = breakers
            .iter()
            .map(|breaker| {
                let state = breaker.state();
                BreakerSnapshot {
                    name: breaker.name().to_string(),
                    state: state.kind(),
                    failure_count: state.failure_count(),
                    metrics: breaker.metrics(),
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Returns the names of breakers that are currently open.
    pub fn open_breakers(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.state == StateKind::Open)
            .map(|s| s.name)
            .collect()
    }

    /// Resets every breaker to closed with empty metrics.
    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        for breaker in breakers {
            breaker.reset();
        }
    }
}
