//! Exponential growth of the breaker reset timeout.

use std::time::Duration;

/// Next reset timeout after a failed half-open probe: doubled, capped at `max`.
pub fn next_reset_timeout(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
