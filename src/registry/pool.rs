//! Provider registry.
//!
//! # Responsibilities
//! - Hold the set of known providers keyed by id
//! - Serve lock-free `get`/`list` to the router and admin API
//! - Serialize registration so concurrent reloads cannot interleave

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::health::Probe;
use crate::observability::metrics;
use crate::registry::provider::{Provider, ProviderSpec};
use crate::telemetry::ring_buffer::DEFAULT_CAPACITY;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("provider '{0}' not found")]
    NotFound(String),
}

type ProviderMap = HashMap<String, Arc<Provider>>;

/// Read-heavy, write-rare map of providers.
///
/// Readers load an immutable snapshot through `ArcSwap`; writers copy the
/// map, modify the copy and swap it in while holding `write_lock`.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: ArcSwap<ProviderMap>,
    write_lock: Mutex<()>,
    telemetry_capacity: usize,
}

impl ProviderRegistry {
    pub fn new(telemetry_capacity: usize) -> Self {
        Self {
            providers: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
            telemetry_capacity,
        }
    }

    /// Register a provider without an active probe.
    pub fn register(&self, spec: ProviderSpec) -> Arc<Provider> {
        self.register_entry(spec, None)
    }

    pub fn register_with_probe(&self, spec: ProviderSpec, probe: Arc<dyn Probe>) -> Arc<Provider> {
        self.register_entry(spec, Some(probe))
    }

    /// Register or replace a provider.
    ///
    /// Re-registering an existing id replaces its metadata and probe but
    /// keeps its breaker and telemetry history.
    pub fn register_entry(&self, spec: ProviderSpec, probe: Option<Arc<dyn Probe>>) -> Arc<Provider> {
        let _guard = self.write_lock.lock();
        let current = self.providers.load();

        let entry = match current.get(&spec.id) {
            Some(existing) => {
                tracing::info!(provider = %spec.id, "Provider re-registered, health history preserved");
                Arc::new(existing.succeed_with(spec, probe))
            }
            None => {
                tracing::info!(
                    provider = %spec.id,
                    capabilities = ?spec.capabilities,
                    priority = spec.priority,
                    "Provider registered"
                );
                let provider = Provider::new(spec, self.telemetry_capacity);
                Arc::new(match probe {
                    Some(probe) => provider.with_probe(probe),
                    None => provider,
                })
            }
        };

        let mut next = ProviderMap::clone(&current);
        next.insert(entry.id().to_string(), Arc::clone(&entry));
        metrics::record_registry_size(next.len());
        self.providers.store(Arc::new(next));
        entry
    }

    /// Remove a provider; its breaker and telemetry go with it.
    pub fn deregister(&self, id: &str) -> Option<Arc<Provider>> {
        let _guard = self.write_lock.lock();
        let current = self.providers.load();
        if !current.contains_key(id) {
            return None;
        }

        let mut next = ProviderMap::clone(&current);
        let removed = next.remove(id);
        metrics::record_registry_size(next.len());
        self.providers.store(Arc::new(next));
        tracing::info!(provider = %id, "Provider deregistered");
        removed
    }

    pub fn get(&self, id: &str) -> Result<Arc<Provider>, RegistryError> {
        self.providers
            .load()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Providers supporting `capability`, ordered by id.
    pub fn list(&self, capability: &str) -> Vec<Arc<Provider>> {
        let mut providers: Vec<_> = self
            .providers
            .load()
            .values()
            .filter(|p| p.supports(capability))
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.id().cmp(b.id()));
        providers
    }

    /// All providers, ordered by id.
    pub fn all(&self) -> Vec<Arc<Provider>> {
        let mut providers: Vec<_> = self.providers.load().values().cloned().collect();
        providers.sort_by(|a, b| a.id().cmp(b.id()));
        providers
    }

    pub fn ids(&self) -> Vec<String> {
        self.all().iter().map(|p| p.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
