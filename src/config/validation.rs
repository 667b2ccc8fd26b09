//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0, weights finite)
//! - Detect duplicate provider ids and unparsable addresses/URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Uri;
use thiserror::Error;

use crate::config::schema::{BreakerConfig, GatewayConfig, ProviderConfig};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `providers[openai].weight`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    if config.admin.force_state_burst == 0 {
        errors.push(ValidationError::new("admin.force_state_burst", "must be at least 1"));
    }
    if config.admin.force_state_per_minute == 0 {
        errors.push(ValidationError::new("admin.force_state_per_minute", "must be at least 1"));
    }
    if config.admin.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        errors.push(ValidationError::new("admin.api_key", "must not be blank when set"));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_breaker(&mut errors, "breaker", &config.breaker);

    if config.telemetry.capacity == 0 {
        errors.push(ValidationError::new("telemetry.capacity", "must be at least 1"));
    }

    if config.prober.interval_ms == 0 {
        errors.push(ValidationError::new("prober.interval_ms", "must be greater than 0"));
    }
    if config.prober.timeout_ms == 0 {
        errors.push(ValidationError::new("prober.timeout_ms", "must be greater than 0"));
    }

    if config.routing.call_timeout_ms == 0 {
        errors.push(ValidationError::new("routing.call_timeout_ms", "must be greater than 0"));
    }
    if config.routing.max_attempts == Some(0) {
        errors.push(ValidationError::new("routing.max_attempts", "must be at least 1 when set"));
    }

    let mut seen = HashSet::new();
    for (index, provider) in config.providers.iter().enumerate() {
        let field = if provider.id.is_empty() {
            format!("providers[{index}]")
        } else {
            format!("providers[{}]", provider.id)
        };

        if provider.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.id"), "must not be empty"));
        } else if !seen.insert(provider.id.as_str()) {
            errors.push(ValidationError::new(format!("{field}.id"), "duplicate provider id"));
        }
        check_provider(&mut errors, &field, provider, &config.breaker);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_provider(
    errors: &mut Vec<ValidationError>,
    field: &str,
    provider: &ProviderConfig,
    defaults: &BreakerConfig,
) {
    if provider.capabilities.is_empty() {
        errors.push(ValidationError::new(
            format!("{field}.capabilities"),
            "at least one capability required",
        ));
    }
    if provider.capabilities.iter().any(|c| c.trim().is_empty()) {
        errors.push(ValidationError::new(
            format!("{field}.capabilities"),
            "capability names must not be blank",
        ));
    }
    if !provider.weight.is_finite() || provider.weight < 0.0 {
        errors.push(ValidationError::new(
            format!("{field}.weight"),
            "must be a finite, non-negative number",
        ));
    }
    if provider.probe_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            format!("{field}.probe_timeout_ms"),
            "must be greater than 0",
        ));
    }
    if let Some(url) = &provider.probe_url {
        match url.parse::<Uri>() {
            Ok(uri) if uri.scheme_str() == Some("http") && uri.host().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(
                format!("{field}.probe_url"),
                "must be an absolute http:// URL",
            )),
            Err(e) => errors.push(ValidationError::new(format!("{field}.probe_url"), e.to_string())),
        }
    }

    let effective = BreakerConfig {
        failure_threshold: provider.failure_threshold.unwrap_or(defaults.failure_threshold),
        reset_timeout_ms: provider.reset_timeout_ms.unwrap_or(defaults.reset_timeout_ms),
        max_reset_timeout_ms: provider
            .max_reset_timeout_ms
            .unwrap_or(defaults.max_reset_timeout_ms),
    };
    // Defaults are reported once under `breaker`
    if effective != *defaults {
        check_breaker(errors, field, &effective);
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, field: &str, breaker: &BreakerConfig) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{field}.failure_threshold"),
            "must be at least 1",
        ));
    }
    if breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{field}.reset_timeout_ms"),
            "must be greater than 0",
        ));
    }
    if breaker.reset_timeout_ms > breaker.max_reset_timeout_ms {
        errors.push(ValidationError::new(
            format!("{field}.max_reset_timeout_ms"),
            "must not be smaller than reset_timeout_ms",
        ));
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, address: &str) {
    if let Err(e) = address.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("invalid socket address: {e}")));
    }
}
