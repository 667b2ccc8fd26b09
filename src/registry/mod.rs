//! Provider registry subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration (startup or reload)
//!     → pool.rs register()/deregister() (serialized writers)
//!     → provider.rs (metadata + breaker + telemetry, one owner each)
//!
//! Router / prober / admin API
//!     → pool.rs get()/list() (lock-free snapshot reads)
//! ```
//!
//! # Design Decisions
//! - Registry is read-heavy, write-rare: copy-on-write map behind `ArcSwap`
//! - Re-registration keeps breaker and telemetry; deregistration drops them
//! - Capability sets are immutable once registered

pub mod pool;
pub mod provider;

pub use pool::{ProviderRegistry, RegistryError};
pub use provider::{Provider, ProviderSpec};
