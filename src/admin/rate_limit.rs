//! Token-bucket limiter for operator overrides.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Takes a token, or returns how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / refill_per_sec))
        }
    }
}

/// Per-provider limit on force-state requests.
#[derive(Debug)]
pub struct ForceStateLimiter {
    buckets: DashMap<String, TokenBucket>,
    burst: f64,
    refill_per_sec: f64,
}

impl ForceStateLimiter {
    pub fn new(burst: u32, per_minute: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            burst: f64::from(burst.max(1)),
            refill_per_sec: f64::from(per_minute.max(1)) / 60.0,
        }
    }

    /// Admit one request for `provider`, or report the wait until the next.
    pub fn check(&self, provider: &str) -> Result<(), Duration> {
        let mut bucket = self
            .buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.refill_per_sec)
    }

    /// Number of tracked providers.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets for providers `keep` rejects.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) {
        self.buckets.retain(|provider, _| keep(provider));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = ForceStateLimiter::new(2, 6);
        assert!(limiter.check("p1").is_ok());
        assert!(limiter.check("p1").is_ok());

        let wait = limiter.check("p1").unwrap_err();
        assert!(wait > Duration::from_secs(9) && wait <= Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("p1").is_ok());
        assert!(limiter.check("p1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_are_per_provider() {
        let limiter = ForceStateLimiter::new(1, 1);
        assert!(limiter.check("p1").is_ok());
        assert!(limiter.check("p1").is_err());
        assert!(limiter.check("p2").is_ok());
    }

    #[test]
    fn test_retain_drops_forgotten_providers() {
        let limiter = ForceStateLimiter::new(1, 1);
        assert!(limiter.check("p1").is_ok());
        assert!(limiter.check("p2").is_ok());
        assert_eq!(limiter.len(), 2);

        limiter.retain(|provider| provider == "p1");
        assert_eq!(limiter.len(), 1);
        // A returning provider starts with a full bucket
        assert!(limiter.check("p2").is_ok());
    }
}
