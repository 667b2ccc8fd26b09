//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probing (prober.rs):
//!     Periodic timer
//!     → Select providers that are OPEN/HALF_OPEN or have gone stale
//!     → Claim breaker admission like any other caller
//!     → Probe (probe.rs) under its own short timeout
//!     → Outcome recorded into breaker + telemetry
//!
//! Passive health:
//!     Every real call already feeds the breaker and telemetry window
//! ```
//!
//! # Design Decisions
//! - The prober is not a special code path; it respects the single-probe rule
//! - Probing runs on its own schedule and never blocks user requests
//! - Health state is per-provider, not per-capability

pub mod probe;
pub mod prober;

pub use probe::{HttpProbe, Probe};
pub use prober::HealthProber;
