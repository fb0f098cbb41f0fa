//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server by its opaque identifier
//! - Carry the static weight (smooth weighted round robin)
//! - Track in-flight calls (least connections)
//! - Keep the ordered, duplicate-free registry each selector owns

/// Weight assigned when the caller does not supply one.
pub const DEFAULT_WEIGHT: u32 = 1;

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Opaque identifier, usually `host:port`.
    pub address: String,
    /// Static weight, always positive.
    pub weight: u32,
    /// Running weight of the smooth weighted round robin.
    pub current_weight: i64,
    /// Number of calls handed out and not yet released.
    pub active_connections: usize,
}

impl Backend {
    /// Create a new backend.
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            current_weight: 0,
            active_connections: 0,
        }
    }

    /// Reserve a connection slot.
    pub fn acquire(&mut self) {
        self.active_connections += 1;
    }

    /// Give a connection slot back. Never goes below zero.
    pub fn release(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }
}

/// Ordered set of backends keyed by address.
#[derive(Debug, Clone, Default)]
pub struct BackendList {
    entries: Vec<Backend>,
}

impl BackendList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the backend with this address.
    pub fn position(&self, address: &str) -> Option<usize> {
        self.entries.iter().position(|b| b.address == address)
    }

    /// Append a backend unless one with the same address exists.
    pub fn insert(&mut self, address: &str, weight: u32) -> bool {
        if self.position(address).is_some() {
            return false;
        }
        self.entries.push(Backend::new(address, weight));
        true
    }

    /// Remove a backend, returning its former index.
    pub fn remove(&mut self, address: &str) -> Option<usize> {
        let index = self.position(address)?;
        self.entries.remove(index);
        Some(index)
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Backend> {
        self.entries.get_mut(index)
    }

    pub fn find_mut(&mut self, address: &str) -> Option<&mut Backend> {
        self.entries.iter_mut().find(|b| b.address == address)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Backend> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Backend> {
        self.entries.iter_mut()
    }

    /// Addresses in registration order.
    pub fn addresses(&self) -> Vec<String> {
        self.entries.iter().map(|b| b.address.clone()).collect()
    }

    /// Sum of all static weights.
    pub fn total_weight(&self) -> i64 {
        self.entries.iter().map(|b| i64::from(b.weight)).sum()
    }
}
