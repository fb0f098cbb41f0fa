//! Traffic distribution core: backend selection strategies and circuit breakers.
//!
//! # Architecture Overview
//!
//! ```text
//!     Caller
//!       │ group, optional key
//!       ▼
//!  ┌──────────────────┐     ┌──────────────────────────────────────┐
//!  │  BackendManager  │────▶│ Selector (per group)                 │
//!  │  (pool)          │     │  round robin │ weighted │ least conn │
//!  └────────┬─────────┘     │  consistent hash ring                │
//!           │ backend       └──────────────────────────────────────┘
//!           ▼
//!  ┌──────────────────┐
//!  │ BreakerRegistry  │──▶ CircuitBreaker (per backend) ──▶ caller's call
//!  └──────────────────┘
//!
//!  Cross-cutting: config (TOML) · observability (tracing, metrics)
//! ```
//!
//! The core does no I/O of its own: callers supply the work to run against the
//! chosen backend and report completion through `release` or a guard.

// Traffic management
pub mod load_balancer;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use config::TrafficConfig;
pub use load_balancer::{
    BackendManager, ConsistentHash, LeastConnections, RoundRobin, SelectError, Selector,
    Strategy, WeightedRoundRobin,
};
pub use resilience::{BreakerError, BreakerRegistry, CircuitBreaker, CircuitState};
