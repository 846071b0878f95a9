// src/orchestration/observer.rs
//! Observation events for the external observer
//!
//! Every completed, JSON-classified exchange publishes one event onto a
//! bounded lock-free queue. The external observer drains the queue at its
//! own pace; when it falls behind, events are dropped and counted rather
//! than blocking the pipeline.

use chrono::Utc;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// What kind of exchange the event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeEventType {
    /// Disaster recovery substituted a cached body
    CacheHit,

    /// A matched exchange completed (possibly mocked)
    CurrentRequest,
}

/// One observed exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeEvent {
    #[serde(rename = "type")]
    pub event_type: ExchangeEventType,

    pub url: String,
    pub method: String,

    /// Request params the exchange was fingerprinted under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Body the caller ultimately observes
    pub response: Value,

    pub cache_key: String,
    pub headers: HashMap<String, String>,

    /// Epoch milliseconds
    pub time: i64,

    /// Distinguishes a mock substitution from a genuine cached/real response
    pub is_mock: bool,
}

impl ExchangeEvent {
    pub fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Bounded lock-free observation queue
pub struct ObservationQueue {
    queue: ArrayQueue<ExchangeEvent>,
    publish_count: AtomicU64,
    drain_count: AtomicU64,
    drop_count: AtomicU64,
}

impl ObservationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            publish_count: AtomicU64::new(0),
            drain_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Publish an event (non-blocking); a full queue drops it
    pub fn publish(&self, event: ExchangeEvent) {
        match self.queue.push(event) {
            Ok(()) => {
                self.publish_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Take the next event (non-blocking)
    pub fn try_drain(&self) -> Option<ExchangeEvent> {
        let event = self.queue.pop();
        if event.is_some() {
            self.drain_count.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Take everything currently queued
    pub fn drain_all(&self) -> Vec<ExchangeEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_drain() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> ObserverStats {
        ObserverStats {
            publish_count: self.publish_count.load(Ordering::Relaxed),
            drain_count: self.drain_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct ObserverStats {
    pub publish_count: u64,
    pub drain_count: u64,
    pub drop_count: u64,
    pub queued: usize,
}
