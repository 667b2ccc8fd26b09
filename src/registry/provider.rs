//! Provider abstraction.
//!
//! # Responsibilities
//! - Represent a single interchangeable backend (LLM API or tool server)
//! - Own exactly one circuit breaker and one telemetry window
//! - Carry immutable routing metadata (capabilities, priority, weight)

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::health::Probe;
use crate::resilience::{BreakerSettings, CircuitBreaker};
use crate::telemetry::{unix_millis, TelemetryRingBuffer};

/// Static description of a provider, as loaded from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    /// Stable key, unique within the registry.
    pub id: String,
    /// Capabilities such as "chat", "embedding" or "filesystem".
    pub capabilities: BTreeSet<String>,
    /// Lower is preferred.
    pub priority: i32,
    /// Relative share among equally good candidates.
    pub weight: f64,
    pub breaker: BreakerSettings,
    /// Overrides the prober's default probe timeout.
    pub probe_timeout: Option<Duration>,
}

impl ProviderSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: BTreeSet::new(),
            priority: 0,
            weight: 1.0,
            breaker: BreakerSettings::default(),
            probe_timeout: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerSettings) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A registered provider: immutable metadata plus live health state.
///
/// Metadata never changes in place; re-registration builds a new `Provider`
/// that shares the previous breaker and telemetry, so routing decisions
/// already holding the old value stay consistent.
#[derive(Debug)]
pub struct Provider {
    spec: ProviderSpec,
    breaker: Arc<CircuitBreaker>,
    telemetry: Arc<TelemetryRingBuffer>,
    probe: Option<Arc<dyn Probe>>,
    /// Last probe dispatch (ms since epoch, 0 = never).
    last_probe_at_ms: Arc<AtomicU64>,
}

impl Provider {
    /// Create a provider with fresh breaker and telemetry state.
    pub fn new(spec: ProviderSpec, telemetry_capacity: usize) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(spec.id.clone(), spec.breaker));
        Self {
            spec,
            breaker,
            telemetry: Arc::new(TelemetryRingBuffer::new(telemetry_capacity)),
            probe: None,
            last_probe_at_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach an active health probe.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// New metadata, same health state.
    pub(crate) fn succeed_with(&self, spec: ProviderSpec, probe: Option<Arc<dyn Probe>>) -> Self {
        self.breaker.reconfigure(spec.breaker);
        Self {
            spec,
            breaker: Arc::clone(&self.breaker),
            telemetry: Arc::clone(&self.telemetry),
            probe,
            last_probe_at_ms: Arc::clone(&self.last_probe_at_ms),
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    pub fn priority(&self) -> i32 {
        self.spec.priority
    }

    pub fn weight(&self) -> f64 {
        self.spec.weight
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.spec.supports(capability)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn telemetry(&self) -> &Arc<TelemetryRingBuffer> {
        &self.telemetry
    }

    pub fn probe(&self) -> Option<&Arc<dyn Probe>> {
        self.probe.as_ref()
    }

    pub fn last_probe_at_ms(&self) -> Option<u64> {
        match self.last_probe_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub(crate) fn mark_probed(&self) {
        self.last_probe_at_ms.store(unix_millis(), Ordering::Relaxed);
    }
}
