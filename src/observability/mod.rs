//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Selectors and breakers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Prometheus text exposition, when the embedding binary installs a recorder
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metric updates are no-ops until a recorder is installed
//! - The library never installs global state on its own

pub mod logging;
pub mod metrics;
