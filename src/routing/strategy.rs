//! Candidate ordering strategies.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::registry::Provider;

/// An allowed provider plus the latency figure it is ranked by.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: Arc<Provider>,
    /// p95 latency over the telemetry window; 0 when there are no samples.
    pub p95_ms: f64,
}

impl Candidate {
    pub fn new(provider: Arc<Provider>) -> Self {
        let p95_ms = provider.telemetry().snapshot().p95_ms().unwrap_or(0.0);
        Self { provider, p95_ms }
    }
}

/// Orders allowed candidates, best first.
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    fn order(&self, candidates: &mut [Candidate]);
}

/// `(priority asc, p95 asc, weight desc, id asc)`.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.provider
        .priority()
        .cmp(&b.provider.priority())
        .then_with(|| a.p95_ms.total_cmp(&b.p95_ms))
        .then_with(|| b.provider.weight().total_cmp(&a.provider.weight()))
        .then_with(|| a.provider.id().cmp(b.provider.id()))
}

/// Deterministic ranking. Same telemetry, same order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ranked;

impl SelectionStrategy for Ranked {
    fn order(&self, candidates: &mut [Candidate]) {
        candidates.sort_by(rank);
    }
}

/// Weighted random order inside the best priority tier; lower tiers ranked.
///
/// Uses weighted sampling without replacement (key = u^(1/w)), so a provider
/// with twice the weight leads twice as often. Zero-weight providers go last
/// within the tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandom;

impl SelectionStrategy for WeightedRandom {
    fn order(&self, candidates: &mut [Candidate]) {
        candidates.sort_by(rank);
        let Some(best) = candidates.first().map(|c| c.provider.priority()) else {
            return;
        };
        let tier = candidates
            .iter()
            .take_while(|c| c.provider.priority() == best)
            .count();

        let mut rng = rand::thread_rng();
        let mut keyed: Vec<(f64, Candidate)> = candidates[..tier]
            .iter()
            .map(|c| {
                let weight = c.provider.weight();
                let key = if weight > 0.0 {
                    rng.gen::<f64>().powf(1.0 / weight)
                } else {
                    -1.0
                };
                (key, c.clone())
            })
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (slot, (_, candidate)) in candidates[..tier].iter_mut().zip(keyed) {
            *slot = candidate;
        }
    }
}

/// Strategy names accepted in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Ranked,
    Weighted,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn SelectionStrategy> {
        match self {
            Self::Ranked => Arc::new(Ranked),
            Self::Weighted => Arc::new(WeightedRandom),
        }
    }
}
