//! Smooth weighted round-robin load balancing strategy.
//!
//! Every pick adds each backend's weight to its running weight, chooses the
//! largest running weight and subtracts the total weight from the winner. The
//! sum of running weights is therefore the same before and after each pick,
//! and selections interleave instead of bursting.

use parking_lot::Mutex;

use crate::load_balancer::backend::BackendList;
use crate::load_balancer::{check_backend, SelectError, SelectResult, Selector};

/// Smooth weighted round-robin selector.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    inner: Mutex<BackendList>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a selector from `(address, weight)` pairs.
    pub fn with_weights<I, S>(weights: I) -> SelectResult<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let wrr = Self::new();
        for (backend, weight) in weights {
            wrr.add_server(backend.as_ref(), Some(weight))?;
        }
        Ok(wrr)
    }

    /// Current running weights, in registration order.
    pub fn current_weights(&self) -> Vec<(String, i64)> {
        self.inner
            .lock()
            .iter()
            .map(|b| (b.address.clone(), b.current_weight))
            .collect()
    }
}

impl Selector for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "weighted-round-robin"
    }

    fn next(&self, _key: Option<&str>) -> SelectResult<String> {
        let mut backends = self.inner.lock();
        let total = backends.total_weight();

        let mut best: Option<usize> = None;
        let mut best_weight = i64::MIN;
        for (i, b) in backends.iter_mut().enumerate() {
            b.current_weight += i64::from(b.weight);
            // strict comparison keeps the first one encountered on ties
            if b.current_weight > best_weight {
                best_weight = b.current_weight;
                best = Some(i);
            }
        }

        let index = best.ok_or(SelectError::NoBackendAvailable)?;
        let selected = backends.get_mut(index).ok_or(SelectError::NoBackendAvailable)?;
        selected.current_weight -= total;
        Ok(selected.address.clone())
    }

    fn add_server(&self, backend: &str, weight: Option<u32>) -> SelectResult<bool> {
        let weight = check_backend(backend, weight)?;
        let added = self.inner.lock().insert(backend, weight);
        if added {
            tracing::info!(backend = %backend, weight, strategy = self.name(), "Backend added");
        }
        Ok(added)
    }

    fn remove_server(&self, backend: &str) -> bool {
        let removed = self.inner.lock().remove(backend).is_some();
        if removed {
            tracing::info!(backend = %backend, strategy = self.name(), "Backend removed");
        }
        removed
    }

    fn servers(&self) -> Vec<String> {
        self.inner.lock().addresses()
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
