//! Failure taxonomy and classification at the call boundary.
//!
//! # Responsibilities
//! - Reduce arbitrary provider errors to a small closed set of kinds
//! - Decide what is retried on another provider and what counts against a breaker
//!
//! # Design Decisions
//! - Classification is a trait implemented by the error type, never string scanning
//! - Breakers and telemetry only ever see an `ErrorKind`
//! - 4xx (other than 408/429) fails identically everywhere, so it is fatal to the request

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified outcome of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Call exceeded its deadline.
    Timeout,
    /// Connection reset, 5xx, rate limiting.
    Transient,
    /// Malformed request that would fail on any provider.
    FatalRequest,
    /// Caller gave up before the provider answered.
    Cancelled,
    /// No allowed provider for the capability. Never recorded in telemetry.
    Exhausted,
}

impl ErrorKind {
    /// Whether the same request may be tried on another provider.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Transient)
    }

    /// Whether the failure increments the provider's breaker counter.
    pub fn counts_against_breaker(self) -> bool {
        matches!(self, Self::Timeout | Self::Transient | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transient => "transient",
            Self::FatalRequest => "fatal-request",
            Self::Cancelled => "cancelled",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorKind {}

/// Errors that can be mapped onto the failure taxonomy.
pub trait Classify {
    fn classify(&self) -> ErrorKind;
}

impl Classify for ErrorKind {
    fn classify(&self) -> ErrorKind {
        *self
    }
}

impl Classify for io::Error {
    fn classify(&self) -> ErrorKind {
        match self.kind() {
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::FatalRequest,
            _ => ErrorKind::Transient,
        }
    }
}

/// Errors a provider adapter reports back to the core.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Could not reach the provider or the connection dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Provider answered with a non-success status.
    #[error("provider returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// Provider throttled the request.
    #[error("rate limited by provider")]
    RateLimited,

    /// Request rejected before reaching any provider logic.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-side deadline exceeded.
    #[error("provider timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProviderError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}

impl Classify for ProviderError {
    fn classify(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::RateLimited => ErrorKind::Transient,
            Self::Timeout => ErrorKind::Timeout,
            Self::InvalidRequest(_) => ErrorKind::FatalRequest,
            Self::Io(e) => e.classify(),
            Self::Status { code, .. } => classify_status(*code),
        }
    }
}

/// Map an HTTP-like status code onto the taxonomy.
pub fn classify_status(code: u16) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 => ErrorKind::Transient,
        400..=499 => ErrorKind::FatalRequest,
        _ => ErrorKind::Transient,
    }
}
