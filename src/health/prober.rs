//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe providers that are recovering or have gone quiet
//! - Feed probe outcomes through the same breaker/telemetry path as traffic
//! - Stop dispatching as soon as shutdown is signalled, cancelling any
//!   probe still in flight

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ProberConfig;
use crate::observability::metrics;
use crate::registry::{Provider, ProviderRegistry};
use crate::resilience::{CircuitState, Executor};

pub struct HealthProber {
    registry: Arc<ProviderRegistry>,
    config: ProberConfig,
    executor: Executor,
    /// Fired on shutdown; in-flight probes end as `cancelled`.
    stop: CancellationToken,
}

impl HealthProber {
    pub fn new(registry: Arc<ProviderRegistry>, config: ProberConfig) -> Self {
        let executor = Executor::new(config.timeout());
        Self {
            registry,
            config,
            executor,
            stop: CancellationToken::new(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Health prober disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval_ms,
            timeout_ms = self.config.timeout_ms,
            stale_after_ms = self.config.stale_after_ms,
            "Health prober starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    let round = self.check_all();
                    tokio::pin!(round);
                    tokio::select! {
                        biased;
                        _ = &mut round => {}
                        _ = shutdown.recv() => {
                            tracing::info!("Health prober received shutdown signal, cancelling probes");
                            self.stop.cancel();
                            round.await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One probing round over every registered provider. Returns how many
    /// probes were dispatched.
    pub async fn check_all(&self) -> usize {
        let providers = self.registry.all();
        let dispatched = join_all(providers.into_iter().map(|p| self.check(p)))
            .await
            .into_iter()
            .filter(|probed| *probed)
            .count();

        if dispatched > 0 {
            tracing::debug!(dispatched, "Probe round complete");
        }
        dispatched
    }

    async fn check(&self, provider: Arc<Provider>) -> bool {
        let Some(probe) = provider.probe().cloned() else {
            return false;
        };

        if self.stop.is_cancelled() {
            return false;
        }
        if provider.breaker().state() == CircuitState::Closed && !self.is_stale(&provider) {
            return false;
        }

        // Same admission as real traffic: OPEN before its reset timeout, or
        // HALF_OPEN with a probe already out, is denied here too.
        let Some(permit) = provider.breaker().try_acquire() else {
            tracing::trace!(provider = %provider.id(), "Probe skipped, breaker denied admission");
            return false;
        };

        provider.mark_probed();
        let timeout = provider
            .spec()
            .probe_timeout
            .unwrap_or_else(|| self.config.timeout());

        let attempted = self
            .executor
            .run(
                Arc::clone(&provider),
                permit,
                move |p: Arc<Provider>| async move { probe.probe(p.spec()).await },
                timeout,
                &self.stop,
            )
            .await;

        match attempted.result {
            Ok(()) => {
                tracing::debug!(
                    provider = %provider.id(),
                    latency_ms = attempted.latency.as_millis() as u64,
                    "Probe succeeded"
                );
                metrics::record_probe(provider.id(), "success");
            }
            Err(failure) => {
                tracing::warn!(
                    provider = %provider.id(),
                    kind = %failure.kind(),
                    error = %failure,
                    "Probe failed"
                );
                metrics::record_probe(provider.id(), failure.kind().as_str());
            }
        }
        true
    }

    fn is_stale(&self, provider: &Provider) -> bool {
        match provider.telemetry().last_recorded_at() {
            Some(at) => Instant::now().saturating_duration_since(at) >= self.config.stale_after(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Probe;
    use crate::registry::ProviderSpec;
    use crate::resilience::{BreakerSettings, ErrorKind, ProviderError};
    use crate::telemetry::TelemetrySample;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct ScriptedProbe {
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self, _spec: &ProviderSpec) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(ProviderError::status(503, "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    fn config() -> ProberConfig {
        ProberConfig {
            enabled: true,
            interval_ms: 500,
            timeout_ms: 200,
            stale_after_ms: 10_000,
        }
    }

    fn setup(reset_ms: u64) -> (Arc<ProviderRegistry>, Arc<ScriptedProbe>, Arc<Provider>) {
        let registry = Arc::new(ProviderRegistry::new(16));
        let probe = Arc::new(ScriptedProbe::default());
        let spec = ProviderSpec::new("p1")
            .with_capability("chat")
            .with_breaker(BreakerSettings {
                failure_threshold: 1,
                reset_timeout: Duration::from_millis(reset_ms),
                max_reset_timeout: Duration::from_millis(reset_ms * 8),
            });
        let provider = registry.register_with_probe(spec, probe.clone());
        (registry, probe, provider)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_recovers_through_probe() {
        let (registry, probe, provider) = setup(1_000);
        provider.breaker().record_failure(ErrorKind::Transient);
        let prober = HealthProber::new(registry, config());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(prober.check_all().await, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(prober.check_all().await, 1);
        assert_eq!(provider.breaker().state(), CircuitState::Closed);
        assert!(provider.last_probe_at_ms().is_some());
        assert_eq!(provider.telemetry().snapshot().success_rate, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens_with_backoff() {
        let (registry, probe, provider) = setup(1_000);
        probe.failing.store(true, Ordering::SeqCst);
        provider.breaker().record_failure(ErrorKind::Transient);
        let prober = HealthProber::new(registry, config());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(prober.check_all().await, 1);

        let snap = provider.breaker().snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.reset_timeout_ms, 2_000);
        assert_eq!(
            provider.telemetry().snapshot().error_kinds.get(&ErrorKind::Transient),
            Some(&1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_provider_probed_only_when_stale() {
        let (registry, probe, provider) = setup(1_000);
        let prober = HealthProber::new(registry, config());

        // No samples yet counts as stale
        assert_eq!(prober.check_all().await, 1);
        assert_eq!(prober.check_all().await, 0);

        tokio::time::advance(Duration::from_millis(10_000)).await;
        assert_eq!(prober.check_all().await, 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        provider.telemetry().record(TelemetrySample::success(Duration::from_millis(1)));
        assert_eq!(prober.check_all().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_with_probe_in_flight_is_skipped() {
        let (registry, probe, provider) = setup(1_000);
        provider.breaker().record_failure(ErrorKind::Transient);
        tokio::time::advance(Duration::from_millis(1_000)).await;

        let held = provider.breaker().try_acquire().expect("probe slot");
        let prober = HealthProber::new(registry, config());
        assert_eq!(prober.check_all().await, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        drop(held);
        assert_eq!(prober.check_all().await, 1);
        assert_eq!(provider.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_provider_without_probe_is_skipped() {
        let registry = Arc::new(ProviderRegistry::new(16));
        registry.register(ProviderSpec::new("bare").with_capability("chat"));
        let prober = HealthProber::new(registry, config());
        assert_eq!(prober.check_all().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_probe_dispatched_after_shutdown() {
        let (registry, probe, _provider) = setup(1_000);
        let mut cfg = config();
        cfg.stale_after_ms = 1;
        let prober = HealthProber::new(registry, cfg);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(prober.run(rx));
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let before = probe.calls.load(Ordering::SeqCst);
        assert!(before >= 2);

        tx.send(()).unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), before);
    }

    #[derive(Debug)]
    struct HangingProbe;

    #[async_trait]
    impl Probe for HangingProbe {
        async fn probe(&self, _spec: &ProviderSpec) -> Result<(), ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_probe() {
        let registry = Arc::new(ProviderRegistry::new(16));
        let provider = registry.register_with_probe(
            ProviderSpec::new("slow").with_capability("chat"),
            Arc::new(HangingProbe),
        );
        let mut cfg = config();
        cfg.timeout_ms = 120_000;
        let prober = HealthProber::new(registry, cfg);
        let (tx, rx) = broadcast::channel(1);

        let started = Instant::now();
        let handle = tokio::spawn(prober.run(rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(provider.last_probe_at_ms().is_some());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("prober stops promptly")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let stats = provider.telemetry().snapshot();
        assert_eq!(stats.error_kinds.get(&ErrorKind::Cancelled), Some(&1));
        assert!(!provider.breaker().snapshot().probe_in_flight);
    }

    #[tokio::test]
    async fn test_disabled_prober_returns_immediately() {
        let (registry, probe, _provider) = setup(1_000);
        let mut cfg = config();
        cfg.enabled = false;
        let (_tx, rx) = broadcast::channel(1);

        HealthProber::new(registry, cfg).run(rx).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
