//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to backend:
//!     → registry.rs (look up or create the backend's breaker)
//!     → circuit_breaker.rs (short-circuit if open, otherwise run the call)
//!     → outcome recorded, circuit opens once failures reach the threshold
//! ```
//!
//! # Design Decisions
//! - Retries and timeouts belong to the caller; the breaker only decides
//!   pass-through vs. short-circuit
//! - Open → Half-Open is evaluated lazily on the next call attempt
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitOpen, CircuitState, Permit};
pub use registry::BreakerRegistry;
