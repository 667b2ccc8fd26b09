//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! handle(capability)
//!     → selector.rs
//!         → registry list(capability)
//!         → partition by breaker admission (read-only)
//!         → strategy.rs (Ranked or WeightedRandom order)
//!         → claim admission for the first candidate that still admits
//!     → Return: Selection (provider + permit) or Exhausted
//! ```
//!
//! # Design Decisions
//! - Selection never returns a provider whose breaker denies it
//! - Deterministic by default: same telemetry, same order
//! - Failed attempts are excluded by the caller and selection is re-run

pub mod selector;
pub mod strategy;

pub use selector::{DeniedProvider, Exhausted, Selection, Selector};
pub use strategy::{Candidate, Ranked, SelectionStrategy, StrategyKind, WeightedRandom};
