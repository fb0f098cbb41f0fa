//! Metrics collection and exposition.
//!
//! # Metrics
//! - `traffic_selections_total` (counter): picks by group, strategy, backend
//! - `traffic_selection_failures_total` (counter): failed picks by group, reason
//! - `circuit_breaker_transitions_total` (counter): transitions by breaker, target state
//! - `circuit_breaker_short_circuits_total` (counter): rejected calls by breaker
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; nothing is recorded until
//!   a recorder is installed
//! - Labels for group, backend and breaker name

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder globally and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

pub fn record_selection(group: &str, strategy: &'static str, backend: &str) {
    ::metrics::counter!(
        "traffic_selections_total",
        "group" => group.to_string(),
        "strategy" => strategy,
        "backend" => backend.to_string()
    )
    .increment(1);
}

pub fn record_selection_failure(group: &str, reason: &'static str) {
    ::metrics::counter!(
        "traffic_selection_failures_total",
        "group" => group.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    ::metrics::counter!(
        "circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    ::metrics::gauge!("circuit_breaker_state", "breaker" => breaker.to_string())
        .set(f64::from(to as u8));
}

pub fn record_short_circuit(breaker: &str) {
    ::metrics::counter!(
        "circuit_breaker_short_circuits_total",
        "breaker" => breaker.to_string()
    )
    .increment(1);
}
