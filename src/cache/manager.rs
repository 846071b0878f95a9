// src/cache/manager.rs
//! Bounded LRU cache with debounced persistence
//!
//! In-memory map iteration order equals access order. Mutations mark the
//! store dirty and (re)schedule a single debounced flush instead of writing
//! per call; bursts collapse into one durable write after a quiet period.
//!
//! Persistence state machine:
//!
//! ```text
//! Clean --set--> Dirty (timer armed) --timer/force_save--> Serializing
//!     Serializing --ok--> Clean
//!     Serializing --err--> evict ~50%, retry once, then drop the write
//! ```

use crate::cache::store::{DurableStore, StoreEvent};
use crate::utils::config::CacheSettings;
use crate::utils::errors::Result;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Share of `max_entries` evicted before an insert at capacity
const INSERT_EVICT_RATIO: f64 = 0.2;

/// Share of entries evicted when the snapshot exceeds the byte ceiling
const OVERFLOW_EVICT_RATIO: f64 = 0.3;

/// Share of entries evicted after a failed durable write
const FAILURE_EVICT_RATIO: f64 = 0.5;

/// One cached exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Cached response body
    pub cache_response: Value,

    /// Request params the body was cached under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_req_params: Option<Value>,
}

impl CacheEntry {
    pub fn new(cache_response: Value, cache_req_params: Option<Value>) -> Self {
        Self {
            cache_response,
            cache_req_params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistState {
    Clean,
    Dirty,
    Serializing,
}

struct CacheInner {
    map: LruCache<String, CacheEntry>,
    state: PersistState,
}

/// Bounded, LRU-evicting, debounce-persisted cache for one origin
pub struct CacheManager {
    origin: String,
    context_id: String,
    settings: CacheSettings,
    store: Arc<dyn DurableStore>,
    inner: Mutex<CacheInner>,
    dirty_notify: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheManager {
    /// Create a manager for an origin, restoring any persisted snapshot
    pub fn new(
        origin: impl Into<String>,
        store: Arc<dyn DurableStore>,
        settings: CacheSettings,
    ) -> Arc<Self> {
        let origin = origin.into();
        let capacity = NonZeroUsize::new(settings.max_entries).unwrap_or(NonZeroUsize::MIN);

        let manager = Arc::new(Self {
            origin,
            context_id: ulid::Ulid::new().to_string(),
            settings,
            store,
            inner: Mutex::new(CacheInner {
                map: LruCache::new(capacity),
                state: PersistState::Clean,
            }),
            dirty_notify: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        });

        manager.restore();
        manager
    }

    /// Start the debounced flusher and the cross-context resync listener
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let manager = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            loop {
                manager.dirty_notify.notified().await;
                // Quiet period; every further mutation re-arms the timer
                loop {
                    let timer =
                        tokio::time::sleep(Duration::from_millis(manager.settings.flush_delay_ms));
                    tokio::select! {
                        _ = timer => break,
                        _ = manager.dirty_notify.notified() => continue,
                    }
                }
                if let Err(e) = manager.flush() {
                    error!("Cache flush failed: {}", e);
                }
            }
        }));

        let manager = Arc::clone(self);
        let mut events = self.store.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.apply_store_event(event),
                    // Missed notifications: replay the authoritative source
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Store events lagged by {}, resyncing", skipped);
                        manager.restore();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Origin this manager caches for
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether a key is cached (no LRU touch)
    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().map.contains(key)
    }

    /// Read a cached entry; a hit moves the key to the MRU end
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().map.get(key).cloned()
    }

    /// Upsert an entry, evicting the oldest ~20% first when at capacity
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        {
            let mut inner = self.inner.lock();
            // Replacement never triggers eviction
            inner.map.pop(&key);
            if inner.map.len() >= self.settings.max_entries {
                let count =
                    (self.settings.max_entries as f64 * INSERT_EVICT_RATIO).ceil() as usize;
                Self::evict_oldest(&mut inner.map, count);
            }
            inner.map.put(key, entry);
            inner.state = PersistState::Dirty;
        }
        self.dirty_notify.notify_one();
    }

    /// Synchronously empty memory and the durable record
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock();
            inner.map.clear();
            inner.state = PersistState::Clean;
        }
        if let Err(e) = self.store.remove(&self.origin, &self.context_id) {
            error!("Failed to clear durable record: {}", e);
        }
    }

    /// Flush immediately; safe to call with no pending timer
    pub fn force_save(&self) -> Result<()> {
        self.flush()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    /// Flush remaining state and stop background tasks (teardown path)
    pub fn shutdown(&self) {
        if let Err(e) = self.flush() {
            error!("Final cache flush failed: {}", e);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn flush(&self) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.state != PersistState::Dirty {
                return Ok(());
            }
            inner.state = PersistState::Serializing;

            let mut snapshot = Self::serialize_map(&inner.map);
            if snapshot.len() as u64 > self.settings.max_store_bytes {
                let count = (inner.map.len() as f64 * OVERFLOW_EVICT_RATIO).ceil() as usize;
                warn!(
                    "Snapshot {} bytes over {} byte ceiling, evicting {} entries",
                    snapshot.len(),
                    self.settings.max_store_bytes,
                    count
                );
                Self::evict_oldest(&mut inner.map, count);
                snapshot = Self::serialize_map(&inner.map);
            }
            snapshot
        };

        match self.store.save(&self.origin, &snapshot, &self.context_id) {
            Ok(()) => {
                self.mark_flushed();
                debug!("Flushed {} bytes for {}", snapshot.len(), self.origin);
                Ok(())
            }
            Err(e) => {
                warn!("Durable write failed ({}), evicting and retrying once", e);
                let snapshot = {
                    let mut inner = self.inner.lock();
                    let count = (inner.map.len() as f64 * FAILURE_EVICT_RATIO).ceil() as usize;
                    Self::evict_oldest(&mut inner.map, count);
                    Self::serialize_map(&inner.map)
                };
                match self.store.save(&self.origin, &snapshot, &self.context_id) {
                    Ok(()) => {
                        self.mark_flushed();
                        Ok(())
                    }
                    Err(e) => {
                        // Not fatal: drop this write, stay dirty for the next one
                        self.inner.lock().state = PersistState::Dirty;
                        error!("Durable write dropped after retry: {}", e);
                        Ok(())
                    }
                }
            }
        }
    }

    fn mark_flushed(&self) {
        let mut inner = self.inner.lock();
        // A set() racing the write keeps the store dirty
        if inner.state == PersistState::Serializing {
            inner.state = PersistState::Clean;
        }
    }

    fn restore(&self) {
        match self.store.load(&self.origin) {
            Ok(Some(snapshot)) => {
                let mut inner = self.inner.lock();
                Self::load_snapshot(&mut inner.map, &snapshot);
                inner.state = PersistState::Clean;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to restore cache snapshot: {}", e),
        }
    }

    fn apply_store_event(&self, event: StoreEvent) {
        if event.origin() != self.origin || event.context_id() == self.context_id {
            return;
        }
        match event {
            StoreEvent::Updated { snapshot, .. } => {
                let mut inner = self.inner.lock();
                Self::load_snapshot(&mut inner.map, &snapshot);
                inner.state = PersistState::Clean;
                debug!("Rebuilt cache from external update for {}", self.origin);
            }
            StoreEvent::Cleared { .. } => {
                let mut inner = self.inner.lock();
                inner.map.clear();
                inner.state = PersistState::Clean;
                debug!("Emptied cache on external clear for {}", self.origin);
            }
        }
    }

    /// Serialize oldest-first so restore reproduces access order
    fn serialize_map(map: &LruCache<String, CacheEntry>) -> String {
        let mut object = serde_json::Map::with_capacity(map.len());
        for (key, entry) in map.iter().collect::<Vec<_>>().into_iter().rev() {
            match serde_json::to_value(entry) {
                Ok(value) => {
                    object.insert(key.clone(), value);
                }
                Err(e) => warn!("Skipping unserializable cache entry {}: {}", key, e),
            }
        }
        Value::Object(object).to_string()
    }

    fn load_snapshot(map: &mut LruCache<String, CacheEntry>, snapshot: &str) {
        let parsed: serde_json::Map<String, Value> = match serde_json::from_str(snapshot) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Corrupted snapshot: keep what we have
                warn!("Ignoring corrupted cache snapshot: {}", e);
                return;
            }
        };

        map.clear();
        for (key, value) in parsed {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    map.put(key, entry);
                }
                Err(e) => warn!("Skipping corrupted cache entry {}: {}", key, e),
            }
        }
    }

    fn evict_oldest(map: &mut LruCache<String, CacheEntry>, count: usize) {
        for _ in 0..count {
            if map.pop_lru().is_none() {
                break;
            }
        }
    }
}
