// src/cache/mod.rs
//! Cache management and durable persistence
//!
//! This module provides the backing store for disaster recovery:
//!
//! - **Manager**: bounded LRU cache with debounced persistence
//! - **Store**: durable key/value store with cross-context change
//!   notification (SQLite and in-memory implementations)
//!
//! # Consistency
//!
//! Contexts never share a lock. Each holds a read-through local copy; the
//! store serializes writes and replays them over a notification channel, so
//! concurrent contexts converge with last-writer-wins semantics per key.

pub mod manager;
pub mod store;

// Re-export commonly used types
pub use manager::{CacheEntry, CacheManager};
pub use store::{DurableStore, MemoryStore, SqliteStore, StoreEvent, DEFAULT_QUOTA_BYTES};
