//! Durable staging area for achievement writes that could not reach the
//! remote store. Entries are keyed by slot (`task:date`), so a newer payload
//! for the same day replaces the older one.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fieldtrack_db::models::DailyAchievement;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const QUEUE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("offline_queue");

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("redb error: {0}")]
    Redb(String),
    #[error("corrupt queue entry {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Key-value store that survives process restarts.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> QueueResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> QueueResult<()>;
    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> QueueResult<bool>;
    /// Deletes the key only if `matches` accepts its current value; the
    /// check and the delete happen atomically. Returns whether it was deleted.
    fn delete_if(&self, key: &str, matches: &dyn Fn(&[u8]) -> bool) -> QueueResult<bool>;
    /// All entries, ordered by key.
    fn entries(&self) -> QueueResult<Vec<(String, Vec<u8>)>>;
}

/// redb-backed [`LocalStore`]; every write is its own transaction.
///
/// redb locks the file exclusively: one open `RedbStore` per queue file.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create the queue file inside `data_dir`.
    pub fn open(data_dir: &Path) -> QueueResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("offline-queue.redb");
        let db = Database::create(&db_path).map_err(|e| {
            QueueError::Redb(format!("failed to open redb at {}: {e}", db_path.display()))
        })?;

        // Create the table up front so read transactions never hit a missing table.
        let txn = db
            .begin_write()
            .map_err(|e| QueueError::Redb(format!("begin_write failed: {e}")))?;
        txn.open_table(QUEUE_TABLE)
            .map_err(|e| QueueError::Redb(format!("open_table failed: {e}")))?;
        txn.commit()
            .map_err(|e| QueueError::Redb(format!("commit failed: {e}")))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl LocalStore for RedbStore {
    fn get(&self, key: &str) -> QueueResult<Option<Vec<u8>>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| QueueError::Redb(format!("begin_read failed: {e}")))?;
        let table = txn
            .open_table(QUEUE_TABLE)
            .map_err(|e| QueueError::Redb(format!("open_table failed: {e}")))?;
        let value = table
            .get(key)
            .map_err(|e| QueueError::Redb(format!("get failed: {e}")))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> QueueResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| QueueError::Redb(format!("begin_write failed: {e}")))?;
        {
            let mut table = txn
                .open_table(QUEUE_TABLE)
                .map_err(|e| QueueError::Redb(format!("open_table failed: {e}")))?;
            table
                .insert(key, value)
                .map_err(|e| QueueError::Redb(format!("insert failed: {e}")))?;
        }
        txn.commit()
            .map_err(|e| QueueError::Redb(format!("commit failed: {e}")))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> QueueResult<bool> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| QueueError::Redb(format!("begin_write failed: {e}")))?;
        let existed = {
            let mut table = txn
                .open_table(QUEUE_TABLE)
                .map_err(|e| QueueError::Redb(format!("open_table failed: {e}")))?;
            let removed = table
                .remove(key)
                .map_err(|e| QueueError::Redb(format!("remove failed: {e}")))?;
            removed.is_some()
        };
        txn.commit()
            .map_err(|e| QueueError::Redb(format!("commit failed: {e}")))?;
        Ok(existed)
    }

    fn delete_if(&self, key: &str, matches: &dyn Fn(&[u8]) -> bool) -> QueueResult<bool> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| QueueError::Redb(format!("begin_write failed: {e}")))?;
        let deleted = {
            let mut table = txn
                .open_table(QUEUE_TABLE)
                .map_err(|e| QueueError::Redb(format!("open_table failed: {e}")))?;
            let current = table
                .get(key)
                .map_err(|e| QueueError::Redb(format!("get failed: {e}")))?
                .map(|guard| guard.value().to_vec());
            match current {
                Some(bytes) if matches(&bytes) => {
                    table
                        .remove(key)
                        .map_err(|e| QueueError::Redb(format!("remove failed: {e}")))?;
                    true
                }
                _ => false,
            }
        };
        txn.commit()
            .map_err(|e| QueueError::Redb(format!("commit failed: {e}")))?;
        Ok(deleted)
    }

    fn entries(&self) -> QueueResult<Vec<(String, Vec<u8>)>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| QueueError::Redb(format!("begin_read failed: {e}")))?;
        let table = txn
            .open_table(QUEUE_TABLE)
            .map_err(|e| QueueError::Redb(format!("open_table failed: {e}")))?;
        let iter = table
            .iter()
            .map_err(|e| QueueError::Redb(format!("iter failed: {e}")))?;

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| QueueError::Redb(format!("read failed: {e}")))?;
            entries.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish()
    }
}

/// Volatile [`LocalStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> QueueResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> QueueResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> QueueResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn delete_if(&self, key: &str, matches: &dyn Fn(&[u8]) -> bool) -> QueueResult<bool> {
        Ok(self.entries.remove_if(key, |_, value| matches(value)).is_some())
    }

    fn entries(&self) -> QueueResult<Vec<(String, Vec<u8>)>> {
        let mut entries: Vec<(String, Vec<u8>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineQueueEntry {
    pub key: String,
    pub payload: DailyAchievement,
    pub timestamp: DateTime<Utc>,
}

/// Typed queue of pending achievement writes over a [`LocalStore`].
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn LocalStore>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Stages `payload` under its slot key, replacing any older entry.
    pub fn enqueue(&self, payload: &DailyAchievement, timestamp: DateTime<Utc>) -> QueueResult<OfflineQueueEntry> {
        let entry = OfflineQueueEntry {
            key: payload.slot_key(),
            payload: payload.clone(),
            timestamp,
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.store.set(&entry.key, &bytes)?;
        debug!(key = %entry.key, "Queued achievement for later sync");
        Ok(entry)
    }

    pub fn dequeue(&self, key: &str) -> QueueResult<Option<OfflineQueueEntry>> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };
        self.store.delete(key)?;
        decode(key, &bytes).map(Some)
    }

    /// Drops the entry for `key` after a confirmed write of a payload last
    /// edited at `saved_at`. An entry edited later is kept for the next replay.
    pub fn settle(&self, key: &str, saved_at: DateTime<Utc>) -> QueueResult<bool> {
        self.store.delete_if(key, &|bytes| {
            // An unreadable entry can never be replayed; the confirmed write supersedes it.
            serde_json::from_slice::<OfflineQueueEntry>(bytes)
                .map_or(true, |entry| entry.payload.updated_at <= saved_at)
        })
    }

    pub fn get(&self, key: &str) -> QueueResult<Option<OfflineQueueEntry>> {
        self.store
            .get(key)?
            .map(|bytes| decode(key, &bytes))
            .transpose()
    }

    /// Pending entries, oldest first.
    pub fn list_pending(&self) -> QueueResult<Vec<OfflineQueueEntry>> {
        let mut pending = self
            .store
            .entries()?
            .into_iter()
            .map(|(key, bytes)| decode(&key, &bytes))
            .collect::<QueueResult<Vec<_>>>()?;
        pending.sort_by_key(|e| e.timestamp);
        Ok(pending)
    }

    pub fn len(&self) -> QueueResult<usize> {
        Ok(self.store.entries()?.len())
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn decode(key: &str, bytes: &[u8]) -> QueueResult<OfflineQueueEntry> {
    serde_json::from_slice(bytes).map_err(|source| QueueError::Corrupt {
        key: key.to_string(),
        source,
    })
}
