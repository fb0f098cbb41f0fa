//! Per-resource circuit breakers.
//!
//! Breakers are created lazily the first time a resource (a route, a backend
//! address) is seen, all with the same settings. Each keeps its own lifecycle.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};

/// A thread-safe map of resource name to circuit breaker.
#[derive(Debug, Clone, Default)]
pub struct BreakerRegistry {
    inner: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Breaker for `resource`, created on first use.
    pub fn get_or_create(&self, resource: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.inner.get(resource) {
            return existing.value().clone();
        }
        // entry() holds the shard lock, so racing callers end up with the same breaker
        self.inner
            .entry(resource.to_string())
            .or_insert_with(|| {
                tracing::debug!(resource = %resource, "Creating circuit breaker");
                Arc::new(CircuitBreaker::from_config(resource, &self.config))
            })
            .value()
            .clone()
    }

    pub fn get(&self, resource: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.get(resource).map(|r| r.value().clone())
    }

    /// Forget the breaker for `resource`. Clones held by callers keep working.
    pub fn remove(&self, resource: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.remove(resource).map(|(_, cb)| cb)
    }

    /// Snapshot of every breaker's state, sorted by resource name.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<(String, CircuitState)> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn reset_all(&self) {
        for r in self.inner.iter() {
            r.value().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
