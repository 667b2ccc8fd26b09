//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - Non-unix targets only see Ctrl+C

use std::io;

/// What the process should do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Installed handlers; keep alive for the life of the process.
pub struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl Signals {
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal of interest.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> io::Result<SignalEvent> {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("SIGINT received");
                Ok(SignalEvent::Shutdown)
            }
            _ = self.terminate.recv() => {
                tracing::info!("SIGTERM received");
                Ok(SignalEvent::Shutdown)
            }
            _ = self.hangup.recv() => {
                tracing::info!("SIGHUP received");
                Ok(SignalEvent::Reload)
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> io::Result<SignalEvent> {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Ctrl+C received");
        Ok(SignalEvent::Shutdown)
    }
}
