//! Fixed-capacity window of recent call outcomes.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::resilience::ErrorKind;
use crate::telemetry::stats::TelemetryStats;
use crate::telemetry::unix_millis;

/// Default number of samples retained per provider.
pub const DEFAULT_CAPACITY: usize = 100;

/// One recorded call outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Monotonic time the sample was recorded.
    pub recorded_at: Instant,
    /// Wall-clock time the sample was recorded (ms since epoch).
    pub timestamp_ms: u64,
    /// Time from call start to completion, timeout or cancellation.
    pub latency: Duration,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
}

impl TelemetrySample {
    pub fn success(latency: Duration) -> Self {
        Self {
            recorded_at: Instant::now(),
            timestamp_ms: unix_millis(),
            latency,
            success: true,
            error_kind: None,
        }
    }

    pub fn failure(latency: Duration, kind: ErrorKind) -> Self {
        Self {
            recorded_at: Instant::now(),
            timestamp_ms: unix_millis(),
            latency,
            success: false,
            error_kind: Some(kind),
        }
    }
}

#[derive(Debug)]
struct Window {
    samples: VecDeque<TelemetrySample>,
    total_recorded: u64,
}

/// Bounded FIFO of samples for a single provider.
///
/// Inserts are O(1); when full the oldest sample is evicted. `snapshot()`
/// copies the window under the lock and aggregates outside it, so a reader
/// never observes a half-written sample and never stalls writers while sorting.
#[derive(Debug)]
pub struct TelemetryRingBuffer {
    capacity: usize,
    window: Mutex<Window>,
}

impl TelemetryRingBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Mutex::new(Window {
                samples: VecDeque::with_capacity(capacity),
                total_recorded: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest one on overflow.
    pub fn record(&self, sample: TelemetrySample) {
        let mut window = self.window.lock();
        if window.samples.len() == self.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);
        window.total_recorded += 1;
    }

    /// Number of samples currently retained.
    pub fn len(&self) -> usize {
        self.window.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonic time of the newest sample, if any.
    pub fn last_recorded_at(&self) -> Option<Instant> {
        self.window.lock().samples.back().map(|s| s.recorded_at)
    }

    /// Copy of the retained samples, oldest first.
    pub fn samples(&self) -> Vec<TelemetrySample> {
        self.window.lock().samples.iter().cloned().collect()
    }

    /// Aggregate statistics over the retained window.
    pub fn snapshot(&self) -> TelemetryStats {
        let (samples, total_recorded) = {
            let window = self.window.lock();
            (
                window.samples.iter().cloned().collect::<Vec<_>>(),
                window.total_recorded,
            )
        };
        TelemetryStats::from_samples(&samples, total_recorded)
    }
}

impl Default for TelemetryRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
