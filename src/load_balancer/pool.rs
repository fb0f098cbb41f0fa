//! Backend pool management.
//!
//! # Responsibilities
//! - Manage collections of backends grouped by name
//! - Apply the group's selection strategy
//! - Provide selection guards that release the pick on drop
//! - Route every call through the backend's circuit breaker

use std::collections::HashMap;
use std::ops::Deref;

use thiserror::Error;

use crate::config::TrafficConfig;
use crate::load_balancer::{SelectError, Selector};
use crate::observability::metrics;
use crate::resilience::{BreakerError, BreakerRegistry};

/// Errors from group lookup and selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("backend group '{0}' not found")]
    UnknownGroup(String),

    #[error("backend group '{group}': {source}")]
    Select {
        group: String,
        #[source]
        source: SelectError,
    },
}

/// Errors from [`BackendManager::call`].
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The selected backend's breaker is open; nothing was sent.
    #[error("circuit open for backend {backend}")]
    CircuitOpen { backend: String },

    /// The call reached the backend and failed.
    #[error("call to {backend} failed: {error}")]
    Call { backend: String, error: E },
}

/// Manages backend groups, their selectors and per-backend circuit breakers.
#[derive(Debug, Default)]
pub struct BackendManager {
    /// Map of group name -> selector owning that group's backends.
    groups: HashMap<String, Box<dyn Selector>>,
    /// Breakers keyed by backend address, shared by all groups.
    breakers: BreakerRegistry,
}

impl BackendManager {
    /// Create a new backend manager from configuration.
    pub fn new(config: &TrafficConfig) -> Self {
        let mut manager = Self {
            groups: HashMap::new(),
            breakers: BreakerRegistry::new(config.breaker),
        };

        for group in &config.groups {
            let selector = group.strategy.build(group.replicas);
            for backend in &group.backends {
                if let Err(e) = selector.add_server(&backend.address, Some(backend.weight)) {
                    tracing::warn!(group = %group.name, error = %e, "Skipping invalid backend");
                }
            }
            tracing::info!(
                group = %group.name,
                strategy = %group.strategy,
                backends = selector.len(),
                "Backend group ready"
            );
            manager.groups.insert(group.name.clone(), selector);
        }

        manager
    }

    /// Register (or replace) a group with a caller-built selector.
    pub fn insert_group(&mut self, name: impl Into<String>, selector: Box<dyn Selector>) {
        self.groups.insert(name.into(), selector);
    }

    /// The selector serving `group`.
    pub fn selector(&self, group: &str) -> Option<&dyn Selector> {
        self.groups.get(group).map(|s| s.as_ref())
    }

    /// Group names, sorted.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Select a backend for the given group.
    ///
    /// The caller is responsible for calling [`BackendManager::release`]
    /// afterwards; prefer [`BackendManager::acquire`] when possible.
    pub fn select(&self, group: &str, key: Option<&str>) -> Result<String, PoolError> {
        let selector = self.lookup(group)?;
        match selector.next(key) {
            Ok(backend) => {
                metrics::record_selection(group, selector.name(), &backend);
                Ok(backend)
            }
            Err(source) => {
                let reason = match source {
                    SelectError::NoBackendAvailable => "no_backend",
                    SelectError::KeyRequired(_) => "key_required",
                    _ => "invalid",
                };
                tracing::debug!(
                    group = %group,
                    backend_count = selector.len(),
                    error = %source,
                    "Selection failed"
                );
                metrics::record_selection_failure(group, reason);
                Err(PoolError::Select {
                    group: group.to_string(),
                    source,
                })
            }
        }
    }

    /// Select a backend and return a guard that releases it on drop.
    pub fn acquire(
        &self,
        group: &str,
        key: Option<&str>,
    ) -> Result<SelectionGuard<'_>, PoolError> {
        let backend = self.select(group, key)?;
        let selector = self.lookup(group)?;
        Ok(SelectionGuard { selector, backend })
    }

    /// Report that a call to `backend` in `group` has completed.
    pub fn release(&self, group: &str, backend: &str) {
        if let Some(selector) = self.groups.get(group) {
            selector.release(backend);
        }
    }

    pub fn add_server(
        &self,
        group: &str,
        backend: &str,
        weight: Option<u32>,
    ) -> Result<bool, PoolError> {
        self.lookup(group)?
            .add_server(backend, weight)
            .map_err(|source| PoolError::Select {
                group: group.to_string(),
                source,
            })
    }

    pub fn remove_server(&self, group: &str, backend: &str) -> Result<bool, PoolError> {
        Ok(self.lookup(group)?.remove_server(backend))
    }

    /// Pick a backend, run `f` against it through its circuit breaker and
    /// release the pick. Exactly one attempt is made.
    pub fn call<T, E, F>(
        &self,
        group: &str,
        key: Option<&str>,
        f: F,
    ) -> Result<T, DispatchError<E>>
    where
        F: FnOnce(&str) -> Result<T, E>,
    {
        let guard = self.acquire(group, key)?;
        let breaker = self.breakers.get_or_create(&guard);

        match breaker.call(|| f(&guard)) {
            Ok(value) => Ok(value),
            Err(BreakerError::Open(_)) => Err(DispatchError::CircuitOpen {
                backend: guard.backend.clone(),
            }),
            Err(BreakerError::Call(error)) => Err(DispatchError::Call {
                backend: guard.backend.clone(),
                error,
            }),
        }
    }

    fn lookup(&self, group: &str) -> Result<&dyn Selector, PoolError> {
        self.selector(group).ok_or_else(|| {
            tracing::debug!(group = %group, "Group not found in BackendManager");
            PoolError::UnknownGroup(group.to_string())
        })
    }
}

/// A RAII guard that releases the selected backend when dropped.
#[derive(Debug)]
pub struct SelectionGuard<'a> {
    selector: &'a dyn Selector,
    pub backend: String,
}

impl Deref for SelectionGuard<'_> {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for SelectionGuard<'_> {
    fn drop(&mut self) {
        self.selector.release(&self.backend);
    }
}
