//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the provider recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed (first caller claims the probe)
//! Half-Open → Closed: probe succeeds (counters and reset_timeout restored)
//! Half-Open → Open: probe fails (reset_timeout doubled up to max)
//! ```
//!
//! # Design Decisions
//! - Per-provider circuit breaker (not global)
//! - Every check-and-transition happens under one short lock, so concurrent
//!   failures never double-open and at most one caller becomes the probe
//! - Probe ownership is tracked by epoch so a stale permit cannot settle or
//!   release a newer probe
//! - Logging and metrics are emitted after the lock is released

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::backoff::next_reset_timeout;
use crate::resilience::ErrorKind;
use crate::telemetry::unix_millis;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States an operator may force a breaker into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForcedState {
    #[serde(alias = "closed")]
    Closed,
    #[serde(alias = "open")]
    Open,
}

impl From<ForcedState> for CircuitState {
    fn from(state: ForcedState) -> Self {
        match state {
            ForcedState::Closed => CircuitState::Closed,
            ForcedState::Open => CircuitState::Open,
        }
    }
}

/// Tunables for a single breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive counted failures that open the circuit.
    pub failure_threshold: u32,
    /// Base wait in OPEN before a probe is allowed.
    pub reset_timeout: Duration,
    /// Upper bound for the backed-off reset timeout.
    pub max_reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(60_000),
            max_reset_timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Point-in-time view of a breaker for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    /// Current (possibly backed-off) reset timeout.
    pub reset_timeout_ms: u64,
    /// Wall-clock time the circuit last opened (ms since epoch).
    pub opened_at_ms: Option<u64>,
    pub probe_in_flight: bool,
    /// Number of times the circuit has opened.
    pub trips: u64,
}

/// Who is reporting an outcome.
#[derive(Debug, Clone, Copy)]
enum Holder {
    /// Raw `record_*` caller; in HALF_OPEN it is assumed to hold the probe.
    Unknown,
    /// Permit holder with its probe epoch, if it claimed one.
    Permit(Option<u64>),
}

#[derive(Debug)]
struct Inner {
    settings: BreakerSettings,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_ms: Option<u64>,
    reset_timeout: Duration,
    probe_in_flight: bool,
    probe_epoch: u64,
    trips: u64,
}

impl Inner {
    fn reset_elapsed(&self) -> bool {
        match self.opened_at {
            Some(at) => Instant::now().saturating_duration_since(at) >= self.reset_timeout,
            None => true,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.opened_at_ms = Some(unix_millis());
        self.probe_in_flight = false;
        self.trips += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.reset_timeout = self.settings.reset_timeout;
        self.opened_at = None;
        self.opened_at_ms = None;
        self.probe_in_flight = false;
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            failure_threshold: self.settings.failure_threshold,
            reset_timeout_ms: self.reset_timeout.as_millis() as u64,
            opened_at_ms: self.opened_at_ms,
            probe_in_flight: self.probe_in_flight,
            trips: self.trips,
        }
    }
}

/// Per-provider circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider_id: String,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(provider_id: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            provider_id: provider_id.into(),
            inner: Mutex::new(Inner {
                settings,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                opened_at_ms: None,
                reset_timeout: settings.reset_timeout,
                probe_in_flight: false,
                probe_epoch: 0,
                trips: 0,
            }),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn settings(&self) -> BreakerSettings {
        self.inner.lock().settings
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Whether `allow()` would currently succeed, without claiming anything.
    pub fn admits(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.reset_elapsed(),
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// May this provider be attempted right now?
    ///
    /// A `true` answer while the circuit is recovering makes the caller the
    /// single half-open probe; it must report the outcome with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn allow(&self) -> bool {
        self.claim().is_some()
    }

    /// Claim admission as an RAII permit.
    ///
    /// Dropping an unsettled permit gives back a claimed probe slot without
    /// recording an outcome.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        self.claim().map(|probe| BreakerPermit {
            breaker: Arc::clone(self),
            probe,
            settled: false,
        })
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        self.settle(None, Holder::Unknown);
    }

    /// Report a failed call. Kinds that do not count against the breaker
    /// leave the failure counter untouched.
    pub fn record_failure(&self, kind: ErrorKind) {
        self.settle(Some(kind), Holder::Unknown);
    }

    /// Operator override. Forcing OPEN denies traffic immediately; forcing
    /// CLOSED clears failure counters and the backed-off reset timeout.
    pub fn force(&self, target: ForcedState) -> BreakerSnapshot {
        let (from, snapshot) = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            match target {
                ForcedState::Open => inner.open(),
                ForcedState::Closed => inner.close(),
            }
            (from, inner.snapshot())
        };
        tracing::warn!(
            provider = %self.provider_id,
            from = %from,
            to = %snapshot.state,
            "Circuit state forced by operator"
        );
        self.announce(from, snapshot.state);
        snapshot
    }

    /// Apply new tunables without disturbing the current state.
    pub fn reconfigure(&self, settings: BreakerSettings) {
        let mut inner = self.inner.lock();
        if inner.settings == settings {
            return;
        }
        inner.settings = settings;
        inner.reset_timeout = if inner.state == CircuitState::Closed {
            settings.reset_timeout
        } else {
            inner
                .reset_timeout
                .min(settings.max_reset_timeout)
                .max(settings.reset_timeout)
        };
        tracing::debug!(
            provider = %self.provider_id,
            failure_threshold = settings.failure_threshold,
            reset_timeout_ms = settings.reset_timeout.as_millis() as u64,
            "Circuit breaker reconfigured"
        );
    }

    /// Returns `Some(probe_epoch)` for a half-open probe, `Some(None)` for a
    /// normal admission and `None` when denied.
    fn claim(&self) -> Option<Option<u64>> {
        let mut inner = self.inner.lock();
        let mut half_opened = false;
        let admitted = match inner.state {
            CircuitState::Closed => Some(None),
            CircuitState::Open if inner.reset_elapsed() => {
                inner.state = CircuitState::HalfOpen;
                half_opened = true;
                Some(Self::claim_probe(&mut inner))
            }
            CircuitState::Open => None,
            CircuitState::HalfOpen if !inner.probe_in_flight => Some(Self::claim_probe(&mut inner)),
            CircuitState::HalfOpen => None,
        };
        drop(inner);

        if half_opened {
            tracing::info!(provider = %self.provider_id, "Circuit half-open, admitting probe call");
            self.announce(CircuitState::Open, CircuitState::HalfOpen);
        }
        admitted
    }

    fn claim_probe(inner: &mut Inner) -> Option<u64> {
        inner.probe_in_flight = true;
        inner.probe_epoch += 1;
        Some(inner.probe_epoch)
    }

    fn settle(&self, failure: Option<ErrorKind>, holder: Holder) {
        let (from, to, failures) = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            let is_probe = from == CircuitState::HalfOpen
                && match holder {
                    Holder::Unknown => true,
                    Holder::Permit(probe) => probe == Some(inner.probe_epoch),
                };

            match failure {
                None if is_probe => inner.close(),
                None => inner.consecutive_failures = 0,
                Some(kind) if !kind.counts_against_breaker() => {
                    if is_probe {
                        inner.probe_in_flight = false;
                    }
                }
                Some(_) => {
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    if is_probe {
                        inner.reset_timeout =
                            next_reset_timeout(inner.reset_timeout, inner.settings.max_reset_timeout);
                        inner.open();
                    } else if from == CircuitState::Closed
                        && inner.consecutive_failures >= inner.settings.failure_threshold
                    {
                        inner.open();
                    }
                }
            }
            (from, inner.state, inner.consecutive_failures)
        };

        if from == to {
            return;
        }
        match to {
            CircuitState::Open if from == CircuitState::HalfOpen => tracing::warn!(
                provider = %self.provider_id,
                "Half-open probe failed, circuit re-opened with backoff"
            ),
            CircuitState::Open => tracing::warn!(
                provider = %self.provider_id,
                consecutive_failures = failures,
                "Failure threshold reached, circuit opened"
            ),
            CircuitState::Closed => tracing::info!(
                provider = %self.provider_id,
                "Probe succeeded, circuit closed"
            ),
            CircuitState::HalfOpen => {}
        }
        self.announce(from, to);
    }

    fn release_probe(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight && inner.probe_epoch == epoch {
            inner.probe_in_flight = false;
        }
    }

    fn announce(&self, from: CircuitState, to: CircuitState) {
        if from != to {
            metrics::record_breaker_transition(&self.provider_id, to);
        }
        metrics::record_breaker_state(&self.provider_id, to);
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug)]
#[must_use = "an unsettled permit releases its probe slot when dropped"]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    probe: Option<u64>,
    settled: bool,
}

impl BreakerPermit {
    /// Whether this permit is the single half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.settle(None, Holder::Permit(self.probe));
    }

    pub fn fail(mut self, kind: ErrorKind) {
        self.settled = true;
        self.breaker.settle(Some(kind), Holder::Permit(self.probe));
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(epoch) = self.probe {
            self.breaker.release_probe(epoch);
        }
    }
}
