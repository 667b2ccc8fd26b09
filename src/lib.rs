//! Provider resilience and failover orchestration.
//!
//! Routes calls for a capability ("chat", "embedding", "filesystem", ...) to
//! one of several interchangeable providers, isolates failing providers behind
//! per-provider circuit breakers and brings them back through health probes.
//!
//! ```text
//!   handle(capability, f)
//!        │
//!        ▼
//!   ┌──────────┐  list(capability)  ┌──────────────────────────────────┐
//!   │ routing  │───────────────────▶│ registry                         │
//!   │ selector │                    │  Provider ─┬─ CircuitBreaker     │
//!   └────┬─────┘                    │            └─ TelemetryRingBuffer│
//!        │ Selection + permit       └──────────────────────────────────┘
//!        ▼                                   ▲            ▲
//!   ┌──────────┐  outcome (ErrorKind)        │            │
//!   │ executor │─────────────────────────────┘            │
//!   └──────────┘                                          │
//!                                      ┌──────────────┐   │
//!                                      │ health prober│───┘
//!                                      └──────────────┘
//! ```

// Core
pub mod gateway;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod telemetry;

// Background and operator surfaces
pub mod admin;
pub mod health;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use gateway::{AttemptRecord, HandleError, Orchestrator, ProviderHealth};
pub use lifecycle::Shutdown;
pub use registry::{Provider, ProviderRegistry, ProviderSpec};
pub use resilience::{CircuitState, Classify, ErrorKind, ForcedState, ProviderError};
