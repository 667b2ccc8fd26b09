//! Request entry point.
//!
//! # Responsibilities
//! - `handle(capability, request_fn)`: select → execute → fall back
//! - Read-only health projection for dashboards and the admin API
//! - Operator overrides and config reconciliation
//!
//! # Data Flow
//! ```text
//! handle("chat", f)
//!     → Selector::select (excluding providers already tried)
//!     → Executor::run (timeout, cancellation, outcome recording)
//!     → Ok                     → return value
//!     → timeout / transient    → exclude provider, select again
//!     → fatal-request / cancelled → return immediately
//!     → nothing left           → HandleError with attempts + denied list
//! ```

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::health::{HttpProbe, Probe};
use crate::observability::metrics;
use crate::registry::{Provider, ProviderRegistry, RegistryError};
use crate::resilience::{
    BreakerSnapshot, CallFailure, CircuitState, Classify, ErrorKind, Executor, ForcedState,
    ProviderError,
};
use crate::routing::{DeniedProvider, SelectionStrategy, Selector, StrategyKind};
use crate::telemetry::LatencyStats;

/// One failed attempt within a `handle()` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub provider: String,
    pub kind: ErrorKind,
    pub latency_ms: u64,
}

/// Why `handle()` produced no value.
///
/// `kind` is the taxonomy tag callers branch on. `attempts` lists every
/// provider that was tried and how it failed; `denied` lists providers the
/// router skipped and the breaker state that excluded them.
#[derive(Debug, Error)]
#[error("{kind} for capability '{capability}' after {} attempt(s)", .attempts.len())]
pub struct HandleError<E> {
    pub kind: ErrorKind,
    pub capability: String,
    pub attempts: Vec<AttemptRecord>,
    pub denied: Vec<DeniedProvider>,
    /// The provider's own error from the last attempt, when it returned one.
    pub last_error: Option<E>,
}

impl<E> HandleError<E> {
    pub fn is_exhausted(&self) -> bool {
        self.kind == ErrorKind::Exhausted
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Per-provider health projection served by `GET providers/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub id: String,
    pub capabilities: Vec<String>,
    pub priority: i32,
    pub weight: f64,
    pub breaker_state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub opened_at_ms: Option<u64>,
    pub probe_in_flight: bool,
    pub trips: u64,
    pub sample_count: usize,
    pub success_rate: Option<f64>,
    pub latency: Option<LatencyStats>,
    pub error_kinds: BTreeMap<ErrorKind, usize>,
    pub last_sample_at_ms: Option<u64>,
    pub last_probe_at_ms: Option<u64>,
}

impl ProviderHealth {
    pub fn of(provider: &Provider) -> Self {
        let breaker = provider.breaker().snapshot();
        let stats = provider.telemetry().snapshot();
        Self {
            id: provider.id().to_string(),
            capabilities: provider.spec().capabilities.iter().cloned().collect(),
            priority: provider.priority(),
            weight: provider.weight(),
            breaker_state: breaker.state,
            consecutive_failures: breaker.consecutive_failures,
            failure_threshold: breaker.failure_threshold,
            reset_timeout_ms: breaker.reset_timeout_ms,
            opened_at_ms: breaker.opened_at_ms,
            probe_in_flight: breaker.probe_in_flight,
            trips: breaker.trips,
            sample_count: stats.count,
            success_rate: stats.success_rate,
            latency: stats.latency,
            error_kinds: stats.error_kinds,
            last_sample_at_ms: stats.last_sample_at_ms,
            last_probe_at_ms: provider.last_probe_at_ms(),
        }
    }
}

/// Outcome of reconciling the registry with a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub registered: Vec<String>,
    pub deregistered: Vec<String>,
}

/// Failover orchestrator: the only type request handlers need.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    selector: Selector,
    executor: Executor,
    max_attempts: Option<usize>,
}

impl Orchestrator {
    /// Ranked selection, default call timeout, unbounded fallback.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            selector: Selector::ranked(Arc::clone(&registry)),
            registry,
            executor: Executor::default(),
            max_attempts: None,
        }
    }

    /// Build the orchestrator and register the configured providers.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ProviderError> {
        let registry = Arc::new(ProviderRegistry::new(config.telemetry.capacity));
        let orchestrator = Self::new(registry)
            .with_strategy(config.routing.strategy)
            .with_call_timeout(config.routing.call_timeout())
            .with_max_attempts(config.routing.max_attempts);
        orchestrator.apply_providers(config)?;
        Ok(orchestrator)
    }

    pub fn with_strategy(self, kind: StrategyKind) -> Self {
        self.with_selection_strategy(kind.build())
    }

    pub fn with_selection_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.selector = Selector::new(Arc::clone(&self.registry), strategy);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.executor = Executor::new(timeout);
        self
    }

    /// Cap on providers tried per request; `None` tries every allowed one.
    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn call_timeout(&self) -> Duration {
        self.executor.default_timeout()
    }

    /// Run `request_fn` on the best provider for `capability`, falling back
    /// to the next one on timeout or transient failure.
    pub async fn handle<T, E, F, Fut>(&self, capability: &str, request_fn: F) -> Result<T, HandleError<E>>
    where
        F: FnMut(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.handle_with_cancel(capability, request_fn, &CancellationToken::new())
            .await
    }

    /// Like [`handle`](Self::handle); firing `cancel` abandons the in-flight
    /// attempt, records it as `cancelled` and returns at once.
    pub async fn handle_with_cancel<T, E, F, Fut>(
        &self,
        capability: &str,
        request_fn: F,
        cancel: &CancellationToken,
    ) -> Result<T, HandleError<E>>
    where
        F: FnMut(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("handle", %request_id, capability);
        self.dispatch(capability, request_fn, cancel)
            .instrument(span)
            .await
    }

    async fn dispatch<T, E, F, Fut>(
        &self,
        capability: &str,
        mut request_fn: F,
        cancel: &CancellationToken,
    ) -> Result<T, HandleError<E>>
    where
        F: FnMut(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let mut excluded = HashSet::new();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<E> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.fail(ErrorKind::Cancelled, capability, attempts, Vec::new(), last_error));
            }

            if let (Some(max), Some(last)) = (self.max_attempts, attempts.last()) {
                if attempts.len() >= max {
                    tracing::warn!(attempts = attempts.len(), "Fallback depth reached");
                    let kind = last.kind;
                    return Err(self.fail(kind, capability, attempts, Vec::new(), last_error));
                }
            }

            let selection = match self.selector.select(capability, &excluded) {
                Ok(selection) => selection,
                Err(exhausted) => {
                    let kind = attempts.last().map_or(ErrorKind::Exhausted, |a| a.kind);
                    if kind == ErrorKind::Exhausted {
                        metrics::record_exhausted(capability);
                        tracing::warn!(
                            denied = exhausted.denied.len(),
                            "No allowed provider for capability"
                        );
                    } else {
                        tracing::warn!(attempts = attempts.len(), "All fallback providers failed");
                    }
                    return Err(self.fail(kind, capability, attempts, exhausted.denied, last_error));
                }
            };

            let provider = selection.provider;
            excluded.insert(provider.id().to_string());
            if let Some(previous) = attempts.last() {
                metrics::record_fallback(capability);
                tracing::info!(
                    from = %previous.provider,
                    to = %provider.id(),
                    reason = %previous.kind,
                    "Falling back to next provider"
                );
            }

            let attempted = self
                .executor
                .run(
                    Arc::clone(&provider),
                    selection.permit,
                    &mut request_fn,
                    self.executor.default_timeout(),
                    cancel,
                )
                .await;

            let failure = match attempted.result {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            let kind = failure.kind();
            tracing::debug!(provider = %provider.id(), kind = %kind, "Attempt failed");
            attempts.push(AttemptRecord {
                provider: provider.id().to_string(),
                kind,
                latency_ms: attempted.latency.as_millis() as u64,
            });
            if let CallFailure::Failed { error, .. } = failure {
                last_error = Some(error);
            }

            if !kind.is_retryable() {
                return Err(self.fail(kind, capability, attempts, Vec::new(), last_error));
            }
        }
    }

    fn fail<E>(
        &self,
        kind: ErrorKind,
        capability: &str,
        attempts: Vec<AttemptRecord>,
        denied: Vec<DeniedProvider>,
        last_error: Option<E>,
    ) -> HandleError<E> {
        HandleError {
            kind,
            capability: capability.to_string(),
            attempts,
            denied,
            last_error,
        }
    }

    /// Health projection of every provider, ordered by id.
    pub fn health_report(&self) -> Vec<ProviderHealth> {
        self.registry
            .all()
            .iter()
            .map(|p| ProviderHealth::of(p))
            .collect()
    }

    pub fn provider_health(&self, id: &str) -> Result<ProviderHealth, RegistryError> {
        self.registry.get(id).map(|p| ProviderHealth::of(&p))
    }

    /// Operator override of a provider's breaker.
    pub fn force_state(&self, id: &str, state: ForcedState) -> Result<BreakerSnapshot, RegistryError> {
        let provider = self.registry.get(id)?;
        let snapshot = provider.breaker().force(state);
        metrics::record_force_state(id, snapshot.state);
        Ok(snapshot)
    }

    /// Reconcile the registry with `config.providers`.
    ///
    /// Every configured provider is (re-)registered, keeping existing breaker
    /// and telemetry state; providers no longer configured are removed. Probe
    /// URLs are all checked before the registry is touched.
    pub fn apply_providers(&self, config: &GatewayConfig) -> Result<ApplySummary, ProviderError> {
        let mut entries = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            let probe = match &provider.probe_url {
                Some(url) => Some(Arc::new(HttpProbe::new(url)?) as Arc<dyn Probe>),
                None => None,
            };
            entries.push((provider.to_spec(&config.breaker), probe));
        }

        let keep: HashSet<&str> = config.providers.iter().map(|p| p.id.as_str()).collect();
        let mut summary = ApplySummary::default();

        for (spec, probe) in entries {
            summary.registered.push(spec.id.clone());
            self.registry.register_entry(spec, probe);
        }
        for id in self.registry.ids() {
            if !keep.contains(id.as_str()) && self.registry.deregister(&id).is_some() {
                summary.deregistered.push(id);
            }
        }

        tracing::info!(
            registered = summary.registered.len(),
            deregistered = summary.deregistered.len(),
            "Provider configuration applied"
        );
        Ok(summary)
    }
}
