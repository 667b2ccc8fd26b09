//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to provider:
//!     → circuit_breaker.rs (claim admission; single probe while half-open)
//!     → executor.rs (enforce timeout / cancellation, measure latency)
//!     → classify.rs (reduce the error to an ErrorKind)
//!     → outcome fed back into the breaker and the telemetry window
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only timeout/transient failures are retried on another provider
//! - Fatal request errors never count against a provider's breaker
//! - Reset timeout grows exponentially on repeated probe failures (backoff.rs)

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod executor;

pub use circuit_breaker::{
    BreakerPermit, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState, ForcedState,
};
pub use classify::{Classify, ErrorKind, ProviderError};
pub use executor::{CallFailure, Executor};
