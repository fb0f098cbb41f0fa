//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Caller asks a group for a backend
//!     → pool.rs (look up the group's selector)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - weighted.rs (smooth weighted round robin)
//!         - least_conn.rs (pick backend with fewest in-flight calls)
//!         - consistent_hash.rs (hash ring with virtual nodes)
//!     → Caller performs the call through a circuit breaker
//!     → release() once the call completes
//! ```
//!
//! # Design Decisions
//! - Every selector owns its backend list; nothing is shared between selectors
//! - One mutex per selector; each read-modify-write is a single critical section
//! - Empty selectors return `SelectError::NoBackendAvailable`, never panic

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod consistent_hash;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

pub use consistent_hash::ConsistentHash;
pub use least_conn::LeastConnections;
pub use pool::{BackendManager, DispatchError, PoolError, SelectionGuard};
pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;

/// Default number of virtual nodes per backend on the hash ring.
pub const DEFAULT_REPLICAS: usize = 150;

/// Errors returned by backend selection and membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    /// The selector has no backends.
    #[error("no backend available")]
    NoBackendAvailable,

    /// Consistent hashing needs a key to route on.
    #[error("a routing key is required by the {0} strategy")]
    KeyRequired(&'static str),

    /// Weights must be positive.
    #[error("invalid weight {weight} for backend {backend}")]
    InvalidWeight { backend: String, weight: u32 },

    /// Backend identifiers must not be empty.
    #[error("backend identifier must not be empty")]
    EmptyBackendId,
}

/// Result type for selector operations.
pub type SelectResult<T> = Result<T, SelectError>;

/// Common interface for all backend selection strategies.
pub trait Selector: Send + Sync + std::fmt::Debug {
    /// Strategy name, used for logging and metric labels.
    fn name(&self) -> &'static str;

    /// Pick the backend that should serve the next call.
    ///
    /// `key` is only consulted by key-affine strategies.
    fn next(&self, key: Option<&str>) -> SelectResult<String>;

    /// Report that a call obtained from [`Selector::next`] has completed.
    fn release(&self, _backend: &str) {}

    /// Add a backend. Returns `Ok(false)` if it is already registered.
    fn add_server(&self, backend: &str, weight: Option<u32>) -> SelectResult<bool>;

    /// Remove a backend. Returns `false` if it was not registered.
    fn remove_server(&self, backend: &str) -> bool;

    /// Registered backends, in registration order.
    fn servers(&self) -> Vec<String>;

    fn len(&self) -> usize {
        self.servers().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Available selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    ConsistentHash,
}

impl Strategy {
    /// Build an empty selector for this strategy.
    ///
    /// `replicas` is only used by [`Strategy::ConsistentHash`].
    pub fn build(self, replicas: usize) -> Box<dyn Selector> {
        match self {
            Strategy::RoundRobin => Box::new(RoundRobin::new()),
            Strategy::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
            Strategy::LeastConnections => Box::new(LeastConnections::new()),
            Strategy::ConsistentHash => Box::new(ConsistentHash::new(replicas)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::WeightedRoundRobin => "weighted-round-robin",
            Strategy::LeastConnections => "least-connections",
            Strategy::ConsistentHash => "consistent-hash",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a backend identifier and optional weight before insertion.
pub(crate) fn check_backend(backend: &str, weight: Option<u32>) -> SelectResult<u32> {
    if backend.is_empty() {
        return Err(SelectError::EmptyBackendId);
    }
    match weight {
        Some(0) => Err(SelectError::InvalidWeight {
            backend: backend.to_string(),
            weight: 0,
        }),
        Some(w) => Ok(w),
        None => Ok(backend::DEFAULT_WEIGHT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_builds_matching_selector() {
        for strategy in [
            Strategy::RoundRobin,
            Strategy::WeightedRoundRobin,
            Strategy::LeastConnections,
            Strategy::ConsistentHash,
        ] {
            let selector = strategy.build(DEFAULT_REPLICAS);
            assert_eq!(selector.name(), strategy.as_str());
            assert!(selector.is_empty());
        }
    }

    #[test]
    fn test_strategy_serde_names() {
        let s: Strategy = serde_json::from_str("\"least-connections\"").unwrap();
        assert_eq!(s, Strategy::LeastConnections);
        assert_eq!(
            serde_json::to_string(&Strategy::WeightedRoundRobin).unwrap(),
            "\"weighted-round-robin\""
        );
    }

    #[test]
    fn test_empty_selectors_report_no_backend() {
        for strategy in [
            Strategy::RoundRobin,
            Strategy::WeightedRoundRobin,
            Strategy::LeastConnections,
            Strategy::ConsistentHash,
        ] {
            let selector = strategy.build(DEFAULT_REPLICAS);
            assert_eq!(selector.next(Some("k")), Err(SelectError::NoBackendAvailable));
        }
    }

    #[test]
    fn test_check_backend() {
        assert_eq!(check_backend("a:1", None), Ok(1));
        assert_eq!(check_backend("a:1", Some(4)), Ok(4));
        assert_eq!(check_backend("", None), Err(SelectError::EmptyBackendId));
        assert!(matches!(
            check_backend("a:1", Some(0)),
            Err(SelectError::InvalidWeight { weight: 0, .. })
        ));
    }

    /// Adding and removing the same backend leaves the selection sequence untouched.
    #[test]
    fn test_add_then_remove_round_trip() {
        for strategy in [
            Strategy::RoundRobin,
            Strategy::WeightedRoundRobin,
            Strategy::LeastConnections,
            Strategy::ConsistentHash,
        ] {
            let reference = strategy.build(DEFAULT_REPLICAS);
            let mutated = strategy.build(DEFAULT_REPLICAS);
            for (b, w) in [("a:1", 3), ("b:1", 2), ("c:1", 1)] {
                reference.add_server(b, Some(w)).unwrap();
                mutated.add_server(b, Some(w)).unwrap();
            }
            assert!(mutated.add_server("d:1", Some(7)).unwrap());
            assert!(mutated.remove_server("d:1"));

            for i in 0..24 {
                let key = format!("user-{}", i);
                assert_eq!(
                    reference.next(Some(&key)).unwrap(),
                    mutated.next(Some(&key)).unwrap(),
                    "strategy {} diverged at call {}",
                    strategy,
                    i
                );
            }
        }
    }
}
