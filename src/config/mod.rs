//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TrafficConfig (validated, immutable)
//!     → BackendManager builds one selector per group
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; membership changes go through the selectors
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::BackendConfig;
pub use schema::BreakerConfig;
pub use schema::GroupConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::TrafficConfig;
pub use validation::ValidationError;
