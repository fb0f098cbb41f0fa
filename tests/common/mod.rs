//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use traffic_core::config::{BackendConfig, BreakerConfig, GroupConfig, TrafficConfig};
use traffic_core::load_balancer::Strategy;

/// A simulated backend whose outcome for the n-th call is decided by `f(n)`.
#[allow(dead_code)]
pub struct ProgrammableBackend<F> {
    calls: AtomicU32,
    f: F,
}

#[allow(dead_code)]
impl<F> ProgrammableBackend<F>
where
    F: Fn(u32) -> Result<(), &'static str>,
{
    pub fn new(f: F) -> Self {
        Self {
            calls: AtomicU32::new(0),
            f,
        }
    }

    pub fn handle(&self) -> Result<(), &'static str> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(n)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Build a single-group configuration.
#[allow(dead_code)]
pub fn group_config(name: &str, strategy: Strategy, backends: &[(&str, u32)]) -> TrafficConfig {
    TrafficConfig {
        groups: vec![GroupConfig {
            name: name.into(),
            strategy,
            replicas: 150,
            backends: backends
                .iter()
                .map(|(address, weight)| BackendConfig {
                    address: address.to_string(),
                    weight: *weight,
                })
                .collect(),
        }],
        breaker: BreakerConfig {
            max_failures: 3,
            reset_timeout_ms: 200,
        },
        ..Default::default()
    }
}

/// Run `f(thread_index)` on `threads` threads released together, collecting results.
#[allow(dead_code)]
pub fn hammer<T, F>(threads: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let f = Arc::new(f);

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f(i)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}
