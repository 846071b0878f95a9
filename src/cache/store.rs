// src/cache/store.rs
//! Durable key/value store with change notification
//!
//! One durable record per origin holds the serialized cache snapshot. Writes
//! are broadcast to every other context observing the same store, which is
//! the only cross-context coordination channel: no shared lock, last writer
//! wins per key.

use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Broadcast channel depth for store change events
const STORE_EVENT_CAPACITY: usize = 64;

/// Default byte quota for a single origin record
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Change notification emitted on every durable mutation
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A record was written; carries the authoritative new snapshot
    Updated {
        origin: String,
        context_id: String,
        snapshot: String,
    },

    /// A record was removed
    Cleared { origin: String, context_id: String },
}

impl StoreEvent {
    /// Origin the event applies to
    pub fn origin(&self) -> &str {
        match self {
            StoreEvent::Updated { origin, .. } => origin,
            StoreEvent::Cleared { origin, .. } => origin,
        }
    }

    /// Context that performed the mutation
    pub fn context_id(&self) -> &str {
        match self {
            StoreEvent::Updated { context_id, .. } => context_id,
            StoreEvent::Cleared { context_id, .. } => context_id,
        }
    }
}

/// Durable backing store for cache snapshots
///
/// `save` fails with [`EngineError::QuotaExceeded`] when the snapshot does
/// not fit the backing medium's byte quota; callers are expected to evict
/// and retry.
pub trait DurableStore: Send + Sync {
    /// Read the snapshot for an origin
    fn load(&self, origin: &str) -> Result<Option<String>>;

    /// Replace the snapshot for an origin and notify other contexts
    fn save(&self, origin: &str, snapshot: &str, context_id: &str) -> Result<()>;

    /// Remove the record for an origin and notify other contexts
    fn remove(&self, origin: &str, context_id: &str) -> Result<()>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// SQLite-backed durable store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota_bytes: u64,
    events: broadcast::Sender<StoreEvent>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>, quota_bytes: u64) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to open database: {}", e))
        })?;
        let store = Self::from_connection(conn, quota_bytes)?;
        info!("Durable store opened at {:?}", path.as_ref());
        Ok(store)
    }

    /// Open an in-memory store (ephemeral contexts, tests)
    pub fn in_memory(quota_bytes: u64) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            EngineError::StorageFailed(format!("Failed to open in-memory database: {}", e))
        })?;
        Self::from_connection(conn, quota_bytes)
    }

    fn from_connection(conn: Connection, quota_bytes: u64) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_records (
                origin TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))?;

        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);

        Ok(Self {
            conn: Mutex::new(conn),
            quota_bytes,
            events,
        })
    }
}

impl DurableStore for SqliteStore {
    fn load(&self, origin: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT snapshot FROM cache_records WHERE origin = ?",
            params![origin],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(EngineError::StorageFailed(format!(
                "Failed to load record: {}",
                e
            ))),
        }
    }

    fn save(&self, origin: &str, snapshot: &str, context_id: &str) -> Result<()> {
        let size = snapshot.len() as u64;
        if size > self.quota_bytes {
            return Err(EngineError::QuotaExceeded {
                size,
                limit: self.quota_bytes,
            });
        }

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO cache_records (origin, snapshot, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(origin) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
            params![origin, snapshot, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Failed to write record: {}", e)))?;
        drop(conn);

        debug!("Saved {} bytes for origin {}", size, origin);

        let _ = self.events.send(StoreEvent::Updated {
            origin: origin.to_string(),
            context_id: context_id.to_string(),
            snapshot: snapshot.to_string(),
        });

        Ok(())
    }

    fn remove(&self, origin: &str, context_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM cache_records WHERE origin = ?",
            params![origin],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Failed to remove record: {}", e)))?;
        drop(conn);

        let _ = self.events.send(StoreEvent::Cleared {
            origin: origin.to_string(),
            context_id: context_id.to_string(),
        });

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// In-memory durable store
///
/// Same contract as [`SqliteStore`] without the disk. Useful for ephemeral
/// contexts and as the test double for quota behavior.
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    quota_bytes: u64,
    events: broadcast::Sender<StoreEvent>,
    save_count: Mutex<u64>,
}

impl MemoryStore {
    pub fn new(quota_bytes: u64) -> Self {
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        Self {
            records: Mutex::new(HashMap::new()),
            quota_bytes,
            events,
            save_count: Mutex::new(0),
        }
    }

    /// Number of successful saves, for flush-batching assertions
    pub fn save_count(&self) -> u64 {
        *self.save_count.lock()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BYTES)
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, origin: &str) -> Result<Option<String>> {
        Ok(self.records.lock().get(origin).cloned())
    }

    fn save(&self, origin: &str, snapshot: &str, context_id: &str) -> Result<()> {
        let size = snapshot.len() as u64;
        if size > self.quota_bytes {
            return Err(EngineError::QuotaExceeded {
                size,
                limit: self.quota_bytes,
            });
        }

        self.records
            .lock()
            .insert(origin.to_string(), snapshot.to_string());
        *self.save_count.lock() += 1;

        let _ = self.events.send(StoreEvent::Updated {
            origin: origin.to_string(),
            context_id: context_id.to_string(),
            snapshot: snapshot.to_string(),
        });

        Ok(())
    }

    fn remove(&self, origin: &str, context_id: &str) -> Result<()> {
        self.records.lock().remove(origin);

        let _ = self.events.send(StoreEvent::Cleared {
            origin: origin.to_string(),
            context_id: context_id.to_string(),
        });

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_save_load_roundtrip() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = SqliteStore::open(dir.path().join("cache.db"), DEFAULT_QUOTA_BYTES)?;

        assert!(store.load("https://a")?.is_none());

        store.save("https://a", r#"{"k":1}"#, "ctx-1")?;
        assert_eq!(store.load("https://a")?.unwrap(), r#"{"k":1}"#);

        // Last write wins
        store.save("https://a", r#"{"k":2}"#, "ctx-1")?;
        assert_eq!(store.load("https://a")?.unwrap(), r#"{"k":2}"#);
        Ok(())
    }

    #[test]
    fn test_sqlite_remove() -> anyhow::Result<()> {
        let store = SqliteStore::in_memory(DEFAULT_QUOTA_BYTES)?;
        store.save("https://a", "{}", "ctx-1")?;
        store.remove("https://a", "ctx-1")?;
        assert!(store.load("https://a")?.is_none());
        Ok(())
    }

    #[test]
    fn test_quota_enforced() {
        let store = SqliteStore::in_memory(16).unwrap();
        let result = store.save("https://a", &"x".repeat(32), "ctx-1");
        assert!(matches!(
            result,
            Err(EngineError::QuotaExceeded { size: 32, limit: 16 })
        ));
        // Nothing was written
        assert!(store.load("https://a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_notification() {
        let store = MemoryStore::default();
        let mut rx = store.subscribe();

        store.save("https://a", r#"{"k":1}"#, "ctx-1").unwrap();
        match rx.recv().await.unwrap() {
            StoreEvent::Updated {
                origin,
                context_id,
                snapshot,
            } => {
                assert_eq!(origin, "https://a");
                assert_eq!(context_id, "ctx-1");
                assert_eq!(snapshot, r#"{"k":1}"#);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        store.remove("https://a", "ctx-2").unwrap();
        match rx.recv().await.unwrap() {
            StoreEvent::Cleared { context_id, .. } => assert_eq!(context_id, "ctx-2"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_origins_are_independent() {
        let store = MemoryStore::default();
        store.save("https://a", "1", "ctx").unwrap();
        store.save("https://b", "2", "ctx").unwrap();
        store.remove("https://a", "ctx").unwrap();
        assert!(store.load("https://a").unwrap().is_none());
        assert_eq!(store.load("https://b").unwrap().unwrap(), "2");
    }
}
