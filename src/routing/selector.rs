//! Provider selection.
//!
//! # Responsibilities
//! - Filter providers by capability and partition them by breaker admission
//! - Order allowed providers with the configured strategy
//! - Claim admission for exactly the provider handed back

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::registry::{Provider, ProviderRegistry};
use crate::resilience::{BreakerPermit, CircuitState};
use crate::routing::strategy::{Candidate, Ranked, SelectionStrategy};

/// A provider that was not eligible, with the breaker state that excluded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeniedProvider {
    pub id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at_ms: Option<u64>,
    pub probe_in_flight: bool,
}

impl DeniedProvider {
    pub fn of(provider: &Provider) -> Self {
        let snap = provider.breaker().snapshot();
        Self {
            id: provider.id().to_string(),
            state: snap.state,
            consecutive_failures: snap.consecutive_failures,
            opened_at_ms: snap.opened_at_ms,
            probe_in_flight: snap.probe_in_flight,
        }
    }
}

/// No allowed provider serves the capability.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("no allowed provider for capability '{capability}' ({} denied)", .denied.len())]
pub struct Exhausted {
    pub capability: String,
    /// Ordered by provider id.
    pub denied: Vec<DeniedProvider>,
}

/// The chosen provider together with its claimed admission.
#[derive(Debug)]
pub struct Selection {
    pub provider: Arc<Provider>,
    pub permit: BreakerPermit,
}

#[derive(Debug, Clone)]
pub struct Selector {
    registry: Arc<ProviderRegistry>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl Selector {
    pub fn new(registry: Arc<ProviderRegistry>, strategy: Arc<dyn SelectionStrategy>) -> Self {
        Self { registry, strategy }
    }

    pub fn ranked(registry: Arc<ProviderRegistry>) -> Self {
        Self::new(registry, Arc::new(Ranked))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Allowed candidates in strategy order, plus the denied providers.
    ///
    /// Read-only: no probe slot is claimed.
    pub fn candidates(
        &self,
        capability: &str,
        excluded: &HashSet<String>,
    ) -> (Vec<Candidate>, Vec<DeniedProvider>) {
        let mut allowed = Vec::new();
        let mut denied = Vec::new();
        for provider in self.registry.list(capability) {
            if excluded.contains(provider.id()) {
                continue;
            }
            if provider.breaker().admits() {
                allowed.push(Candidate::new(provider));
            } else {
                denied.push(DeniedProvider::of(&provider));
            }
        }
        self.strategy.order(&mut allowed);
        (allowed, denied)
    }

    /// Pick the best allowed provider for `capability`, skipping `excluded`.
    ///
    /// A candidate whose admission is lost between ranking and claiming (a
    /// concurrent caller took the half-open probe) is moved to the denied
    /// list and the next one is tried.
    pub fn select(&self, capability: &str, excluded: &HashSet<String>) -> Result<Selection, Exhausted> {
        let (allowed, mut denied) = self.candidates(capability, excluded);

        for candidate in allowed {
            match candidate.provider.breaker().try_acquire() {
                Some(permit) => {
                    tracing::debug!(
                        provider = %candidate.provider.id(),
                        capability,
                        p95_ms = candidate.p95_ms,
                        probe = permit.is_probe(),
                        "Provider selected"
                    );
                    return Ok(Selection {
                        provider: candidate.provider,
                        permit,
                    });
                }
                None => denied.push(DeniedProvider::of(&candidate.provider)),
            }
        }

        denied.sort_by(|a, b| a.id.cmp(&b.id));
        Err(Exhausted {
            capability: capability.to_string(),
            denied,
        })
    }
}
