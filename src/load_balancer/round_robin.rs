//! Round-robin load balancing strategy.

use parking_lot::Mutex;

use crate::load_balancer::backend::BackendList;
use crate::load_balancer::{check_backend, SelectError, SelectResult, Selector};

/// Round-robin selector.
/// Hands out backends in strict cyclic order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    inner: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    backends: BackendList,
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a selector pre-populated with `backends`.
    pub fn with_servers<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rr = Self::new();
        {
            let mut st = rr.inner.lock();
            for b in backends {
                let b = b.as_ref();
                if !b.is_empty() {
                    st.backends.insert(b, 1);
                }
            }
        }
        rr
    }
}

impl Selector for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn next(&self, _key: Option<&str>) -> SelectResult<String> {
        let mut st = self.inner.lock();
        let len = st.backends.len();
        let backend = st
            .backends
            .get(st.cursor)
            .map(|b| b.address.clone())
            .ok_or(SelectError::NoBackendAvailable)?;
        st.cursor = (st.cursor + 1) % len;
        Ok(backend)
    }

    fn add_server(&self, backend: &str, weight: Option<u32>) -> SelectResult<bool> {
        check_backend(backend, weight)?;
        let added = self.inner.lock().backends.insert(backend, 1);
        if added {
            tracing::info!(backend = %backend, strategy = self.name(), "Backend added");
        }
        Ok(added)
    }

    fn remove_server(&self, backend: &str) -> bool {
        let mut st = self.inner.lock();
        if st.backends.remove(backend).is_none() {
            return false;
        }
        if st.cursor >= st.backends.len() {
            st.cursor = 0;
        }
        tracing::info!(backend = %backend, strategy = self.name(), "Backend removed");
        true
    }

    fn servers(&self) -> Vec<String> {
        self.inner.lock().backends.addresses()
    }

    fn len(&self) -> usize {
        self.inner.lock().backends.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::with_servers(["A", "B", "C"]);

        let picks: Vec<String> = (0..7).map(|_| lb.next(None).unwrap()).collect();
        assert_eq!(picks, ["A", "B", "C", "A", "B", "C", "A"]);
    }

    #[test]
    fn test_each_backend_once_per_cycle() {
        let lb = RoundRobin::with_servers((0..5).map(|i| format!("10.0.0.{}:80", i)));
        let mut seen: Vec<String> = (0..5).map(|_| lb.next(None).unwrap()).collect();
        let first = seen[0].clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
        assert_eq!(lb.next(None).unwrap(), first);
    }

    #[test]
    fn test_empty_returns_error() {
        let lb = RoundRobin::new();
        assert_eq!(lb.next(None), Err(SelectError::NoBackendAvailable));
    }

    #[test]
    fn test_remove_resets_out_of_range_cursor() {
        let lb = RoundRobin::with_servers(["A", "B", "C"]);
        lb.next(None).unwrap();
        lb.next(None).unwrap();
        // cursor now points at C
        assert!(lb.remove_server("C"));
        assert_eq!(lb.next(None).unwrap(), "A");
        assert_eq!(lb.next(None).unwrap(), "B");
    }

    #[test]
    fn test_remove_last_backend() {
        let lb = RoundRobin::with_servers(["A"]);
        assert!(lb.remove_server("A"));
        assert!(!lb.remove_server("A"));
        assert_eq!(lb.next(None), Err(SelectError::NoBackendAvailable));

        lb.add_server("B", None).unwrap();
        assert_eq!(lb.next(None).unwrap(), "B");
    }

    #[test]
    fn test_add_appends_and_ignores_duplicates() {
        let lb = RoundRobin::with_servers(["A", "B"]);
        assert!(lb.add_server("C", None).unwrap());
        assert!(!lb.add_server("A", None).unwrap());
        assert_eq!(lb.servers(), ["A", "B", "C"]);
    }
}
