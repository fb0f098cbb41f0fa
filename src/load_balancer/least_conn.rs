//! Least Connections load balancing strategy.

use parking_lot::Mutex;

use crate::load_balancer::backend::BackendList;
use crate::load_balancer::{check_backend, SelectError, SelectResult, Selector};

/// Least connections selector.
/// Selects the backend with the fewest calls in flight and reserves a slot on it.
/// Every successful [`Selector::next`] must be paired with one [`Selector::release`].
#[derive(Debug, Default)]
pub struct LeastConnections {
    inner: Mutex<BackendList>,
}

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lc = Self::new();
        {
            let mut list = lc.inner.lock();
            for b in backends {
                let b = b.as_ref();
                if !b.is_empty() {
                    list.insert(b, 1);
                }
            }
        }
        lc
    }

    /// In-flight calls for `backend`, or `None` if it is not registered.
    pub fn connections(&self, backend: &str) -> Option<usize> {
        let list = self.inner.lock();
        let index = list.position(backend)?;
        list.get(index).map(|b| b.active_connections)
    }
}

impl Selector for LeastConnections {
    fn name(&self) -> &'static str {
        "least-connections"
    }

    fn next(&self, _key: Option<&str>) -> SelectResult<String> {
        let mut list = self.inner.lock();

        // min_by_key keeps the first minimum, so ties go to registration order
        let selected = list
            .iter_mut()
            .min_by_key(|b| b.active_connections)
            .ok_or(SelectError::NoBackendAvailable)?;
        selected.acquire();
        Ok(selected.address.clone())
    }

    fn release(&self, backend: &str) {
        let mut list = self.inner.lock();
        match list.find_mut(backend) {
            Some(b) => b.release(),
            None => tracing::debug!(backend = %backend, "Release for unknown backend ignored"),
        }
    }

    fn add_server(&self, backend: &str, weight: Option<u32>) -> SelectResult<bool> {
        check_backend(backend, weight)?;
        let added = self.inner.lock().insert(backend, 1);
        if added {
            tracing::info!(backend = %backend, strategy = self.name(), "Backend added");
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
