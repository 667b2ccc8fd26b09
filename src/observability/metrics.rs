//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define failover metrics (calls, breaker state, probes, fallbacks)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Track per-provider and per-capability series
//!
//! # Metrics
//! - `failover_calls_total` (counter): calls by provider, outcome
//! - `failover_call_duration_seconds` (histogram): latency per provider
//! - `failover_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `failover_breaker_transitions_total` (counter): transitions by target state
//! - `failover_probes_total` (counter): probes by provider, result
//! - `failover_fallbacks_total` / `failover_exhausted_total` (counter): per capability
//! - `failover_force_state_total` / `failover_admin_rate_limited_total` (counter)
//! - `failover_registered_providers` (gauge)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users and
//!   tests pay nothing
//! - Labels are bounded: provider ids, capabilities and fixed outcome names

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_call(provider: &str, outcome: &'static str, latency: Duration) {
    ::metrics::counter!(
        "failover_calls_total",
        "provider" => provider.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "failover_call_duration_seconds",
        "provider" => provider.to_owned()
    )
    .record(latency.as_secs_f64());
}

pub fn record_breaker_state(provider: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    ::metrics::gauge!("failover_breaker_state", "provider" => provider.to_owned()).set(value);
}

pub fn record_breaker_transition(provider: &str, to: CircuitState) {
    ::metrics::counter!(
        "failover_breaker_transitions_total",
        "provider" => provider.to_owned(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_probe(provider: &str, result: &'static str) {
    ::metrics::counter!(
        "failover_probes_total",
        "provider" => provider.to_owned(),
        "result" => result
    )
    .increment(1);
}

pub fn record_fallback(capability: &str) {
    ::metrics::counter!("failover_fallbacks_total", "capability" => capability.to_owned()).increment(1);
}

pub fn record_exhausted(capability: &str) {
    ::metrics::counter!("failover_exhausted_total", "capability" => capability.to_owned()).increment(1);
}

pub fn record_force_state(provider: &str, state: CircuitState) {
    ::metrics::counter!(
        "failover_force_state_total",
        "provider" => provider.to_owned(),
        "state" => state.as_str()
    )
    .increment(1);
}

pub fn record_rate_limited() {
    ::metrics::counter!("failover_admin_rate_limited_total").increment(1);
}

pub fn record_registry_size(size: usize) {
    ::metrics::gauge!("failover_registered_providers").set(size as f64);
}
