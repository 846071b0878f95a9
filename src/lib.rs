// src/lib.rs
//! ReqGuard Engine Library
//!
//! This library intercepts outbound network calls, inspects and optionally
//! mutates their responses, and provides mock substitution, transparent
//! fail-over to cached responses on temporary server errors, and passive
//! recording of matched JSON exchanges.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **interception**: hook pipeline wrapping the two network call shapes
//! - **resolver**: canonical fingerprints and response classification
//! - **cache**: bounded LRU cache with debounced durable persistence
//! - **orchestration**: per-context bootstrap, mock rules, observation events
//! - **observability**: tracing and logging
//! - **utils**: configuration, errors, common helpers

// Public module exports
pub mod cache;
pub mod interception;
pub mod observability;
pub mod orchestration;
pub mod resolver;
pub mod utils;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheManager, DurableStore, MemoryStore, SqliteStore};
pub use interception::{
    dispatch, EventDrivenCall, HookEngine, HookFilter, HttpTransport, InterceptedRequest,
    InterceptedResponse, RequestInit, Transport,
};
pub use orchestration::{ConfigHandle, ContextBootstrap, ExchangeEvent, HookConfig, MockRule};
pub use resolver::{canonical_key, classify, ProcessStatus};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
