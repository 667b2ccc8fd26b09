//! Aggregates derived from a telemetry window.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::resilience::ErrorKind;
use crate::telemetry::ring_buffer::TelemetrySample;

/// Latency distribution over a window, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

/// Read-only aggregate of a provider's recent calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryStats {
    /// Samples in the window.
    pub count: usize,
    /// Samples ever recorded, including evicted ones.
    pub total_recorded: u64,
    pub success_count: usize,
    /// Successes over samples the provider is accountable for; excludes
    /// `fatal-request`. `None` while there are none.
    pub success_rate: Option<f64>,
    /// `None` while the window is empty.
    pub latency: Option<LatencyStats>,
    /// Failure count per error kind within the window.
    pub error_kinds: BTreeMap<ErrorKind, usize>,
    /// Wall-clock time of the newest sample (ms since epoch).
    pub last_sample_at_ms: Option<u64>,
}

impl TelemetryStats {
    pub fn from_samples(samples: &[TelemetrySample], total_recorded: u64) -> Self {
        let count = samples.len();
        let success_count = samples.iter().filter(|s| s.success).count();

        let mut error_kinds = BTreeMap::new();
        for kind in samples.iter().filter_map(|s| s.error_kind) {
            *error_kinds.entry(kind).or_insert(0) += 1;
        }

        // fatal-request outcomes say nothing about the provider's health
        let judged = count - error_kinds.get(&ErrorKind::FatalRequest).copied().unwrap_or(0);
        let success_rate = (judged > 0).then(|| success_count as f64 / judged as f64);

        let mut latencies: Vec<Duration> = samples.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();
        let latency = latency_stats(&latencies);

        Self {
            count,
            total_recorded,
            success_count,
            success_rate,
            latency,
            error_kinds,
            last_sample_at_ms: samples.last().map(|s| s.timestamp_ms),
        }
    }

    /// p95 latency in milliseconds, if any samples exist.
    pub fn p95_ms(&self) -> Option<f64> {
        self.latency.map(|l| l.p95_ms)
    }
}

fn latency_stats(sorted: &[Duration]) -> Option<LatencyStats> {
    let (first, last) = (sorted.first()?, sorted.last()?);
    let total: f64 = sorted.iter().map(as_ms).sum();
    Some(LatencyStats {
        min_ms: as_ms(first),
        max_ms: as_ms(last),
        avg_ms: total / sorted.len() as f64,
        p50_ms: as_ms(&percentile(sorted, 50.0)),
        p95_ms: as_ms(&percentile(sorted, 95.0)),
    })
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

fn as_ms(d: &Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
