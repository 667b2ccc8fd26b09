//! Per-provider call telemetry.
//!
//! # Data Flow
//! ```text
//! Call outcome (executor or prober)
//!     → TelemetrySample { latency, success, error kind }
//!     → ring_buffer.rs (fixed window, oldest evicted first)
//!
//! Read side (router, admin API):
//!     snapshot()
//!     → copy window out of the lock
//!     → stats.rs (success rate, percentiles, error histogram)
//! ```
//!
//! # Design Decisions
//! - One buffer per provider; buffers never share a lock
//! - Writers hold the lock only for a push; sorting happens on the copy
//! - Sample timestamps use `tokio::time::Instant` so staleness follows a paused test clock

pub mod ring_buffer;
pub mod stats;

use std::time::{SystemTime, UNIX_EPOCH};

pub use ring_buffer::{TelemetryRingBuffer, TelemetrySample};
pub use stats::{LatencyStats, TelemetryStats};

/// Milliseconds since the Unix epoch, for timestamps shown to operators.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
