// src/orchestration/mod.rs
//! Orchestration layer
//!
//! Per-context wiring of the three leaves (interception, resolver, cache):
//!
//! - **Bootstrap**: waits for late-arriving configuration, registers the
//!   decision pipeline (JSON filter → classify → mock override → disaster
//!   recovery → cache write → observation)
//! - **Mock Rules**: externally supplied, read-only rule registry
//! - **Observer**: bounded lock-free queue of exchange events for the
//!   external observer

pub mod bootstrap;
pub mod mock_rules;
pub mod observer;

// Re-export commonly used types
pub use bootstrap::{ConfigHandle, ContextBootstrap, HookConfig};
pub use mock_rules::{MockRegistry, MockRule};
pub use observer::{ExchangeEvent, ExchangeEventType, ObservationQueue, ObserverStats};
