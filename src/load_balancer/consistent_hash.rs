//! Consistent hashing load balancing strategy.
//!
//! # Ring Layout
//! ```text
//! backend "a:80" → hash("a:80:0"), hash("a:80:1"), ... hash("a:80:{replicas-1}")
//! ring = all virtual nodes sorted ascending by hash
//! lookup(key) → first node with hash >= hash(key), wrapping to ring[0]
//! ```
//!
//! # Design Decisions
//! - 32-bit positions taken from the first four bytes of a SHA-256 digest
//! - Removing a backend drops only its own virtual nodes, so keys owned by
//!   other backends keep their placement
//! - Equal hashes are ordered by backend id to keep lookups deterministic

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::load_balancer::{check_backend, SelectError, SelectResult, Selector, DEFAULT_REPLICAS};

/// Hash ring selector.
#[derive(Debug)]
pub struct ConsistentHash {
    replicas: usize,
    inner: Mutex<Ring>,
}

#[derive(Debug, Default)]
struct Ring {
    /// Virtual nodes, sorted by `(hash, backend)`.
    nodes: Vec<(u32, String)>,
    /// Real backends in registration order.
    backends: Vec<String>,
}

impl Ring {
    /// Place `backend`'s virtual nodes; `false` if it is already present.
    fn insert(&mut self, backend: &str, nodes: Vec<(u32, String)>) -> bool {
        if self.backends.iter().any(|b| b == backend) {
            return false;
        }
        self.backends.push(backend.to_string());
        self.nodes.extend(nodes);
        self.nodes.sort_unstable();
        true
    }
}

/// Position of `key` on the ring.
pub fn hash_key(key: &str) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

impl ConsistentHash {
    /// Create an empty ring with `replicas` virtual nodes per backend.
    /// A replica count of zero is treated as one.
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            inner: Mutex::new(Ring::default()),
        }
    }

    pub fn with_servers<I, S>(replicas: usize, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ch = Self::new(replicas);
        for b in backends {
            let b = b.as_ref();
            if !b.is_empty() {
                let nodes = ch.virtual_nodes(b);
                ch.inner.lock().insert(b, nodes);
            }
        }
        ch
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Number of virtual nodes currently on the ring.
    pub fn ring_len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Resolve `key` to the backend owning its ring position.
    pub fn get(&self, key: &str) -> SelectResult<String> {
        let hash = hash_key(key);
        let ring = self.inner.lock();
        if ring.nodes.is_empty() {
            return Err(SelectError::NoBackendAvailable);
        }

        let mut index = ring.nodes.partition_point(|(h, _)| *h < hash);
        if index == ring.nodes.len() {
            index = 0;
        }
        Ok(ring.nodes[index].1.clone())
    }

    fn virtual_nodes(&self, backend: &str) -> Vec<(u32, String)> {
        (0..self.replicas)
            .map(|i| (hash_key(&format!("{}:{}", backend, i)), backend.to_string()))
            .collect()
    }
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}

impl Selector for ConsistentHash {
    fn name(&self) -> &'static str {
        "consistent-hash"
    }

    fn next(&self, key: Option<&str>) -> SelectResult<String> {
        match key {
            Some(key) => self.get(key),
            None if self.is_empty() => Err(SelectError::NoBackendAvailable),
            None => Err(SelectError::KeyRequired(self.name())),
        }
    }

    fn add_server(&self, backend: &str, weight: Option<u32>) -> SelectResult<bool> {
        check_backend(backend, weight)?;

        // hashing happens outside the lock
        let nodes = self.virtual_nodes(backend);

        let mut ring = self.inner.lock();
        if !ring.insert(backend, nodes) {
            return Ok(false);
        }
        tracing::info!(
            backend = %backend,
            replicas = self.replicas,
            ring_size = ring.nodes.len(),
            "Backend added to hash ring"
        );
        Ok(true)
    }

    fn remove_server(&self, backend: &str) -> bool {
        let mut ring = self.inner.lock();
        let Some(index) = ring.backends.iter().position(|b| b == backend) else {
            return false;
        };
        ring.backends.remove(index);
        ring.nodes.retain(|(_, owner)| owner != backend);
        tracing::info!(
            backend = %backend,
            ring_size = ring.nodes.len(),
            "Backend removed from hash ring"
        );
        true
    }

    fn servers(&self) -> Vec<String> {
        self.inner.lock().backends.clone()
    }

    fn len(&self) -> usize {
        self.inner.lock().backends.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ring() -> ConsistentHash {
        ConsistentHash::with_servers(150, ["server1:8080", "server2:8080", "server3:8080"])
    }

    #[test]
    fn test_same_key_same_backend() {
        let ch = ring();
        let a = ch.get("test-key").unwrap();
        let b = ch.get("test-key").unwrap();
        assert_eq!(a, b);
        assert_eq!(ch.next(Some("test-key")).unwrap(), a);
    }

    #[test]
    fn test_ring_size_and_order() {
        let ch = ring();
        assert_eq!(ch.ring_len(), 450);
        let nodes = ch.inner.lock().nodes.clone();
        assert!(nodes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_removal_only_remaps_removed_backend_keys() {
        let ch = ring();
        let keys: Vec<String> = (0..1000).map(|i| format!("user{}", i)).collect();
        let before: HashMap<&String, String> =
            keys.iter().map(|k| (k, ch.get(k).unwrap())).collect();

        assert!(ch.remove_server("server1:8080"));
        assert_eq!(ch.ring_len(), 300);

        for k in &keys {
            let after = ch.get(k).unwrap();
            assert_ne!(after, "server1:8080");
            if before[k] != "server1:8080" {
                assert_eq!(after, before[k], "key {} moved", k);
            }
        }
    }

    #[test]
    fn test_load_spread_is_reasonable() {
        let ch = ring();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..3000 {
            *counts.entry(ch.get(&format!("k{}", i)).unwrap()).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 3);
        for c in counts.values() {
            assert!(*c > 500, "skewed distribution: {:?}", counts);
        }
    }

    #[test]
    fn test_wraps_past_largest_hash() {
        let ch = ConsistentHash::with_servers(4, ["a:1", "b:1", "c:1"]);
        let nodes = ch.inner.lock().nodes.clone();
        let largest = nodes[nodes.len() - 1].0;
        let first_owner = &nodes[0].1;

        let past_end: Vec<String> = (0..1000)
            .map(|i| format!("k{}", i))
            .filter(|k| hash_key(k) > largest)
            .collect();
        assert!(!past_end.is_empty(), "no key hashed past {}", largest);

        for key in &past_end {
            assert_eq!(&ch.get(key).unwrap(), first_owner, "key {} did not wrap", key);
        }
    }

    #[test]
    fn test_key_required_and_empty() {
        let ch = ConsistentHash::default();
        assert_eq!(ch.next(None), Err(SelectError::NoBackendAvailable));
        assert_eq!(ch.get("k"), Err(SelectError::NoBackendAvailable));

        ch.add_server("a:1", None).unwrap();
        assert_eq!(ch.next(None), Err(SelectError::KeyRequired("consistent-hash")));
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let ch = ConsistentHash::new(10);
        assert!(ch.add_server("a:1", None).unwrap());
        assert!(!ch.add_server("a:1", None).unwrap());
        assert_eq!(ch.ring_len(), 10);
        assert!(!ch.remove_server("b:1"));
    }

    #[test]
    fn test_with_servers_skips_empty_and_duplicate_ids() {
        let ch = ConsistentHash::with_servers(10, ["a:1", "", "b:1", "a:1"]);
        assert_eq!(ch.servers(), vec!["a:1", "b:1"]);
        assert_eq!(ch.ring_len(), 20);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_key("user1"), hash_key("user1"));
        assert_ne!(hash_key("user1"), hash_key("user2"));
    }
}
