//! Call execution with timeout, cancellation and outcome recording.
//!
//! # Responsibilities
//! - Wrap the opaque provider call with a hard deadline
//! - Stop waiting immediately when the caller cancels
//! - Record latency and classified outcome into telemetry and the breaker
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The in-flight guard records `cancelled` if the call future is dropped
//!   before completion, so abandoned calls still teach the breaker
//! - Breakers and telemetry never see the raw error, only its `ErrorKind`

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::registry::Provider;
use crate::resilience::{BreakerPermit, Classify, ErrorKind};
use crate::telemetry::TelemetrySample;

/// Default deadline for a provider call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a single attempt against one provider did not produce a value.
#[derive(Debug, Error)]
pub enum CallFailure<E> {
    /// The provider's breaker denied the call.
    #[error("circuit open for provider '{0}'")]
    Rejected(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("call cancelled by caller")]
    Cancelled,

    /// The provider answered with an error.
    #[error("{kind} failure: {error}")]
    Failed { kind: ErrorKind, error: E },
}

impl<E> CallFailure<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(_) => ErrorKind::Exhausted,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Failed { kind, .. } => *kind,
        }
    }
}

/// Result of one attempt plus the latency that was recorded for it.
#[derive(Debug)]
pub(crate) struct Attempted<T, E> {
    pub result: Result<T, CallFailure<E>>,
    pub latency: Duration,
}

/// Executes calls against a chosen provider.
#[derive(Debug, Clone)]
pub struct Executor {
    default_timeout: Duration,
}

impl Executor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `request_fn` against `provider` if its breaker admits the call.
    pub async fn execute<T, E, F, Fut>(
        &self,
        provider: &Arc<Provider>,
        request_fn: F,
        timeout: Duration,
    ) -> Result<T, CallFailure<E>>
    where
        F: FnOnce(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.execute_with_cancel(provider, request_fn, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute) but returns `Cancelled` as soon as
    /// `cancel` fires, without waiting for the provider.
    pub async fn execute_with_cancel<T, E, F, Fut>(
        &self,
        provider: &Arc<Provider>,
        request_fn: F,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<T, CallFailure<E>>
    where
        F: FnOnce(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let Some(permit) = provider.breaker().try_acquire() else {
            return Err(CallFailure::Rejected(provider.id().to_string()));
        };
        self.run(Arc::clone(provider), permit, request_fn, timeout, cancel)
            .await
            .result
    }

    pub(crate) async fn run<T, E, F, Fut>(
        &self,
        provider: Arc<Provider>,
        permit: BreakerPermit,
        request_fn: F,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Attempted<T, E>
    where
        F: FnOnce(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let mut in_flight = InFlight::start(Arc::clone(&provider), permit);
        let call = tokio::time::timeout(timeout, request_fn(provider));

        let completed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = call => Some(res),
        };

        let (result, outcome) = match completed {
            None => (Err(CallFailure::Cancelled), Err(ErrorKind::Cancelled)),
            Some(Err(_elapsed)) => (Err(CallFailure::Timeout(timeout)), Err(ErrorKind::Timeout)),
            Some(Ok(Ok(value))) => (Ok(value), Ok(())),
            Some(Ok(Err(error))) => {
                let kind = match error.classify() {
                    ErrorKind::Exhausted => ErrorKind::Transient,
                    kind => kind,
                };
                (Err(CallFailure::Failed { kind, error }), Err(kind))
            }
        };

        let latency = in_flight.settle(outcome);
        Attempted { result, latency }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

/// Guard for one dispatched call. Settles exactly once.
struct InFlight {
    provider: Arc<Provider>,
    permit: Option<BreakerPermit>,
    started: Instant,
}

impl InFlight {
    fn start(provider: Arc<Provider>, permit: BreakerPermit) -> Self {
        Self {
            provider,
            permit: Some(permit),
            started: Instant::now(),
        }
    }

    fn settle(&mut self, outcome: Result<(), ErrorKind>) -> Duration {
        let latency = self.started.elapsed();
        let Some(permit) = self.permit.take() else {
            return latency;
        };

        let (sample, label) = match outcome {
            Ok(()) => (TelemetrySample::success(latency), "success"),
            Err(kind) => (TelemetrySample::failure(latency, kind), kind.as_str()),
        };
        self.provider.telemetry().record(sample);
        match outcome {
            Ok(()) => permit.succeed(),
            Err(kind) => permit.fail(kind),
        }

        tracing::trace!(
            provider = %self.provider.id(),
            outcome = label,
            latency_ms = latency.as_millis() as u64,
            "Call settled"
        );
        metrics::record_call(self.provider.id(), label, latency);
        latency
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.permit.is_some() {
            tracing::debug!(provider = %self.provider.id(), "Call dropped before completion");
            self.settle(Err(ErrorKind::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderSpec;
    use crate::resilience::{BreakerSettings, CircuitState, ProviderError};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn provider(threshold: u32) -> Arc<Provider> {
        let spec = ProviderSpec::new("p1")
            .with_capability("chat")
            .with_breaker(BreakerSettings {
                failure_threshold: threshold,
                ..BreakerSettings::default()
            });
        Arc::new(Provider::new(spec, 16))
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let p = provider(3);
        let exec = Executor::default();
        let out: Result<&str, CallFailure<ProviderError>> = exec
            .execute(&p, |_| async { Ok("hello") }, Duration::from_secs(1))
            .await;

        assert_eq!(out.unwrap(), "hello");
        let stats = p.telemetry().snapshot();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.success_rate, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let p = provider(1);
        let exec = Executor::default();
        let out: Result<(), CallFailure<ProviderError>> = exec
            .execute(
                &p,
                |_| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                },
                Duration::from_millis(250),
            )
            .await;

        assert!(matches!(out, Err(CallFailure::Timeout(_))));
        let stats = p.telemetry().snapshot();
        assert_eq!(stats.error_kinds.get(&ErrorKind::Timeout), Some(&1));
        assert!(stats.latency.unwrap().max_ms >= 250.0);
        assert_eq!(p.breaker().state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_error_is_classified_before_recording() {
        let p = provider(1);
        let exec = Executor::default();
        let out: Result<(), _> = exec
            .execute(
                &p,
                |_| async { Err(ProviderError::status(400, "bad prompt")) },
                Duration::from_secs(1),
            )
            .await;

        match out {
            Err(CallFailure::Failed { kind, error }) => {
                assert_eq!(kind, ErrorKind::FatalRequest);
                assert!(error.to_string().contains("bad prompt"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(p.breaker().state(), CircuitState::Closed);
        assert_eq!(p.breaker().snapshot().consecutive_failures, 0);
        assert_eq!(
            p.telemetry().snapshot().error_kinds.get(&ErrorKind::FatalRequest),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_rejected_when_breaker_open() {
        let p = provider(1);
        p.breaker().record_failure(ErrorKind::Transient);
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        let out: Result<(), CallFailure<ProviderError>> = Executor::default()
            .execute(
                &p,
                |_| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                Duration::from_secs(1),
            )
            .await;

        assert!(matches!(out, Err(CallFailure::Rejected(ref id)) if id == "p1"));
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(p.telemetry().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_immediately() {
        let p = provider(5);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let out: Result<(), CallFailure<ProviderError>> = Executor::default()
            .execute_with_cancel(
                &p,
                |_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                },
                Duration::from_secs(120),
                &token,
            )
            .await;

        assert!(matches!(out, Err(CallFailure::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(p.breaker().snapshot().consecutive_failures, 1);
        assert_eq!(
            p.telemetry().snapshot().error_kinds.get(&ErrorKind::Cancelled),
            Some(&1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_records_cancelled() {
        let p = provider(5);
        let exec = Executor::default();
        let fut = exec.execute(
            &p,
            |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ProviderError>(())
            },
            Duration::from_secs(120),
        );

        let raced = tokio::time::timeout(Duration::from_millis(10), fut).await;
        assert!(raced.is_err());

        let stats = p.telemetry().snapshot();
        assert_eq!(stats.error_kinds.get(&ErrorKind::Cancelled), Some(&1));
        assert_eq!(p.breaker().snapshot().consecutive_failures, 1);
    }
}
