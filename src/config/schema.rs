//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the failover
//! service. All types derive Serde traits for deserialization from TOML.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::ProviderSpec;
use crate::resilience::BreakerSettings;
use crate::routing::StrategyKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Admin API settings.
    pub admin: AdminConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Breaker defaults applied to providers that do not override them.
    pub breaker: BreakerConfig,

    /// Telemetry window settings.
    pub telemetry: TelemetryConfig,

    /// Active health probing.
    pub prober: ProberConfig,

    /// Call timeout and fallback policy.
    pub routing: RoutingConfig,

    /// Provider definitions.
    pub providers: Vec<ProviderConfig>,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Bearer token. Authentication is disabled when unset.
    pub api_key: Option<String>,

    /// Force-state requests allowed back to back, per provider.
    pub force_state_burst: u32,

    /// Sustained force-state rate, per provider.
    pub force_state_per_minute: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: None,
            force_state_burst: 3,
            force_state_per_minute: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Circuit breaker defaults.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Base wait in OPEN before a probe is admitted.
    pub reset_timeout_ms: u64,

    /// Cap for the backed-off reset timeout.
    pub max_reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            max_reset_timeout_ms: 900_000,
        }
    }
}

/// Telemetry window configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Samples retained per provider.
    pub capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Health prober configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProberConfig {
    /// Enable active probing.
    pub enabled: bool,

    /// Probe round interval in milliseconds.
    pub interval_ms: u64,

    /// Default probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// A CLOSED provider with no sample newer than this gets probed.
    pub stale_after_ms: u64,
}

impl ProberConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            timeout_ms: 5_000,
            stale_after_ms: 60_000,
        }
    }
}

/// Routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Hard deadline for a single provider call.
    pub call_timeout_ms: u64,

    /// Providers tried per request. Unset means every allowed provider.
    pub max_attempts: Option<usize>,

    pub strategy: StrategyKind,
}

impl RoutingConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            max_attempts: None,
            strategy: StrategyKind::Ranked,
        }
    }
}

/// One provider definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProviderConfig {
    /// Unique provider identifier.
    pub id: String,

    /// Capabilities served, e.g. "chat" or "embedding".
    pub capabilities: BTreeSet<String>,

    /// Lower is preferred.
    #[serde(default)]
    pub priority: i32,

    /// Share among equally good providers (default: 1.0).
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Health URL for the active prober.
    #[serde(default)]
    pub probe_url: Option<String>,

    #[serde(default)]
    pub failure_threshold: Option<u32>,

    #[serde(default)]
    pub reset_timeout_ms: Option<u64>,

    #[serde(default)]
    pub max_reset_timeout_ms: Option<u64>,

    #[serde(default)]
    pub probe_timeout_ms: Option<u64>,
}

fn default_weight() -> f64 {
    1.0
}

impl ProviderConfig {
    /// Effective breaker settings, falling back to the `[breaker]` defaults.
    pub fn breaker_settings(&self, defaults: &BreakerConfig) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            reset_timeout: Duration::from_millis(
                self.reset_timeout_ms.unwrap_or(defaults.reset_timeout_ms),
            ),
            max_reset_timeout: Duration::from_millis(
                self.max_reset_timeout_ms.unwrap_or(defaults.max_reset_timeout_ms),
            ),
        }
    }

    pub fn to_spec(&self, defaults: &BreakerConfig) -> ProviderSpec {
        let mut spec = ProviderSpec::new(self.id.clone())
            .with_capabilities(self.capabilities.iter().cloned())
            .with_priority(self.priority)
            .with_weight(self.weight)
            .with_breaker(self.breaker_settings(defaults));
        if let Some(ms) = self.probe_timeout_ms {
            spec = spec.with_probe_timeout(Duration::from_millis(ms));
        }
        spec
    }
}
