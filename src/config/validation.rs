//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check naming integrity (unique groups, unique backends per group)
//! - Validate value ranges (weights, replicas, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TrafficConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::TrafficConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("group name must not be empty")]
    EmptyGroupName,

    #[error("duplicate group '{0}'")]
    DuplicateGroup(String),

    #[error("group '{0}' has no backends")]
    NoBackends(String),

    #[error("group '{group}' has a backend with an empty address")]
    EmptyAddress { group: String },

    #[error("group '{group}' lists backend '{address}' more than once")]
    DuplicateBackend { group: String, address: String },

    #[error("backend '{address}' in group '{group}' has weight 0")]
    ZeroWeight { group: String, address: String },

    #[error("group '{0}' has replicas = 0")]
    ZeroReplicas(String),

    #[error("breaker.max_failures must be positive")]
    ZeroMaxFailures,

    #[error("breaker.reset_timeout_ms must be positive")]
    ZeroResetTimeout,

    #[error("unknown log level '{0}'")]
    InvalidLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &TrafficConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut group_names = HashSet::new();

    for group in &config.groups {
        if group.name.is_empty() {
            errors.push(ValidationError::EmptyGroupName);
        } else if !group_names.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateGroup(group.name.clone()));
        }

        if group.backends.is_empty() {
            errors.push(ValidationError::NoBackends(group.name.clone()));
        }
        if group.replicas == 0 {
            errors.push(ValidationError::ZeroReplicas(group.name.clone()));
        }

        let mut addresses = HashSet::new();
        for backend in &group.backends {
            if backend.address.is_empty() {
                errors.push(ValidationError::EmptyAddress {
                    group: group.name.clone(),
                });
                continue;
            }
            if !addresses.insert(backend.address.as_str()) {
                errors.push(ValidationError::DuplicateBackend {
                    group: group.name.clone(),
                    address: backend.address.clone(),
                });
            }
            if backend.weight == 0 {
                errors.push(ValidationError::ZeroWeight {
                    group: group.name.clone(),
                    address: backend.address.clone(),
                });
            }
        }
    }

    if config.breaker.max_failures == 0 {
        errors.push(ValidationError::ZeroMaxFailures);
    }
    if config.breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::ZeroResetTimeout);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
