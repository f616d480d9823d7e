pub mod connectivity;
pub mod offline_queue;
pub mod remote;
pub mod retry;

pub use connectivity::Connectivity;
pub use offline_queue::{LocalStore, MemoryStore, OfflineQueue, OfflineQueueEntry, RedbStore};
pub use remote::AchievementRemote;
pub use retry::RetryPolicy;

use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::NaiveDate;
use fieldtrack_db::models::{DailyAchievement, Task};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::dao::base::{DaoError, DaoResult, RemoteErrorKind};
use crate::error::{TrackError, TrackResult};
use crate::store::{SyncEvent, TaskStore};

/// How a save ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Confirmed by the remote store; carries the stored record.
    Saved(DailyAchievement),
    /// Remote unreachable after every retry; the payload sits in the offline queue.
    SavedOffline(DailyAchievement),
}

impl SaveOutcome {
    pub fn record(&self) -> &DailyAchievement {
        match self {
            SaveOutcome::Saved(record) | SaveOutcome::SavedOffline(record) => record,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, SaveOutcome::SavedOffline(_))
    }
}

/// A snapshot that has been applied to the task store and handed to the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub task: Task,
    pub save: SaveOutcome,
}

#[derive(Debug, Default)]
pub struct FlushReport {
    pub synced: Vec<String>,
    pub still_pending: Vec<String>,
    pub failed: Vec<(String, TrackError)>,
}

/// Single chokepoint for remote achievement writes.
///
/// Saves look the record up by `(task_id, date)`, update or insert, recover
/// from duplicate-key races by retrying as an update, back off on network
/// failures and finally stage the payload in the offline queue.
pub struct SyncEngine {
    remote: Arc<dyn AchievementRemote>,
    queue: OfflineQueue,
    store: Arc<TaskStore>,
    connectivity: Connectivity,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    flush_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn AchievementRemote>,
        queue: OfflineQueue,
        store: Arc<TaskStore>,
        connectivity: Connectivity,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            remote,
            queue,
            store,
            connectivity,
            clock,
            policy,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn pending_offline_count(&self) -> TrackResult<usize> {
        Ok(self.queue.len()?)
    }

    /// Applies `task` to the store (optimistic `TaskUpdated`) and saves the
    /// achievement for `date`. The returned task carries the merged remote id.
    ///
    /// A save the remote refuses outright puts the day back the way it was, so
    /// the snapshot never shows data that exists neither remotely nor in the
    /// offline queue.
    pub async fn commit(&self, task: Task, date: NaiveDate) -> TrackResult<Recorded> {
        let task_id = task.id;
        let achievement = task.achievement(date).cloned().ok_or_else(|| {
            TrackError::Precondition(format!("no achievement recorded for {date}"))
        })?;
        let previous = self.store.get(task_id)?.achievement(date).cloned();
        self.store.apply(task);

        let save = match self.save(&achievement).await {
            Ok(save) => save,
            Err(err) => {
                self.store
                    .restore_achievement(task_id, date, previous, Some(&achievement));
                return Err(err);
            }
        };
        let task = self.store.get(task_id)?;
        Ok(Recorded { task, save })
    }

    /// Persists `achievement`, retrying network failures and queueing it
    /// locally once retries are exhausted.
    pub async fn save(&self, achievement: &DailyAchievement) -> TrackResult<SaveOutcome> {
        let payload = achievement.persistable();
        let key = payload.slot_key();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.save_once(&payload).await {
                Ok(saved) => {
                    // Only entries no newer than this payload are superseded.
                    self.queue.settle(&key, payload.updated_at)?;
                    self.store.merge_achievement(&saved);
                    self.store.emit(SyncEvent::Synced { key: key.clone() });
                    debug!(%key, attempt, "Achievement saved");
                    return Ok(SaveOutcome::Saved(saved));
                }
                Err(err) if err.kind() == RemoteErrorKind::Network => {
                    if self.policy.should_retry(attempt) {
                        let delay = self.policy.delay_for(attempt);
                        warn!(%key, attempt, max = self.policy.max_attempts, ?delay, error = %err, "Save failed, retrying");
                        self.store.emit(SyncEvent::Retrying {
                            key: key.clone(),
                            attempt,
                            max_attempts: self.policy.max_attempts,
                            delay,
                        });
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    self.queue.enqueue(&payload, self.clock.now())?;
                    self.store.emit(SyncEvent::SavedOffline { key: key.clone() });
                    info!(%key, attempts = attempt, online = self.connectivity.is_online(), "Saved locally, will sync later");
                    return Ok(SaveOutcome::SavedOffline(payload));
                }
                Err(err) => {
                    error!(%key, error = %err, "Save failed");
                    return Err(err.into());
                }
            }
        }
    }

    /// One upsert round trip including duplicate-key recovery.
    async fn save_once(&self, payload: &DailyAchievement) -> DaoResult<DailyAchievement> {
        let existing = self
            .remote
            .find_by_task_and_date(payload.task_id, payload.date)
            .await?;

        let result = match existing.and_then(|e| e.id) {
            Some(id) => match self.remote.update(id, payload).await {
                // Deleted remotely since the lookup: write it back fresh.
                Err(DaoError::NotFound) => self.remote.insert(payload).await,
                other => other,
            },
            None => self.remote.insert(payload).await,
        };

        match result {
            Err(err) if err.kind() == RemoteErrorKind::DuplicateKey => {
                warn!(key = %payload.slot_key(), "Duplicate key on insert, retrying as update");
                self.recover_duplicate(payload).await
            }
            other => other,
        }
    }

    /// A concurrent write created the canonical record first; update it once.
    async fn recover_duplicate(&self, payload: &DailyAchievement) -> DaoResult<DailyAchievement> {
        let existing = self
            .remote
            .find_by_task_and_date(payload.task_id, payload.date)
            .await?
            .and_then(|e| e.id)
            .ok_or_else(|| {
                DaoError::DuplicateKey(format!(
                    "record for {} collided but could not be found",
                    payload.slot_key()
                ))
            })?;

        self.remote.update(existing, payload).await.map_err(|err| match err.kind() {
            // Recovery gets exactly one chance; escalate as a conflict.
            RemoteErrorKind::Network | RemoteErrorKind::NotFound | RemoteErrorKind::Other => {
                DaoError::DuplicateKey(format!(
                    "update after duplicate key failed for {}: {}",
                    payload.slot_key(),
                    err
                ))
            }
            _ => err,
        })
    }

    /// Removes the durable record for the achievement's slot and any queued write.
    pub async fn delete(&self, achievement: &DailyAchievement) -> TrackResult<bool> {
        let key = achievement.slot_key();
        let id = match achievement.id {
            Some(id) => Some(id),
            None => self
                .remote
                .find_by_task_and_date(achievement.task_id, achievement.date)
                .await?
                .and_then(|e| e.id),
        };

        let Some(id) = id else {
            self.queue.dequeue(&key)?;
            debug!(%key, "Nothing stored remotely to delete");
            return Ok(false);
        };

        let deleted = self.remote.delete(id).await?;
        self.queue.dequeue(&key)?;
        info!(%key, deleted, "Achievement deleted");
        Ok(deleted)
    }

    /// Loads every remote record for a task into its cached snapshot.
    pub async fn hydrate(&self, task_id: ObjectId) -> TrackResult<Task> {
        let records = self.remote.list_by_task(task_id).await?;
        debug!(%task_id, count = records.len(), "Hydrating task from remote store");
        self.store.merge_remote(task_id, records)
    }

    /// Replays every queued write. Entries that sync are removed; anything
    /// else stays queued for the next reconnect.
    pub async fn flush_pending(&self) -> TrackResult<FlushReport> {
        let _guard = self.flush_lock.lock().await;
        let pending = self.queue.list_pending()?;
        let mut report = FlushReport::default();

        if pending.is_empty() {
            return Ok(report);
        }
        info!(count = pending.len(), "Replaying offline queue");

        for entry in pending {
            // The same slot may have been saved while we waited for the lock.
            if self.queue.get(&entry.key)?.is_none() {
                continue;
            }
            match self.save(&entry.payload).await {
                Ok(SaveOutcome::Saved(_)) => report.synced.push(entry.key),
                Ok(SaveOutcome::SavedOffline(_)) => report.still_pending.push(entry.key),
                Err(err) => {
                    warn!(key = %entry.key, error = %err, "Queued achievement could not be replayed");
                    report.failed.push((entry.key, err));
                }
            }
        }

        info!(
            synced = report.synced.len(),
            pending = report.still_pending.len(),
            failed = report.failed.len(),
            "Offline queue replay finished"
        );
        Ok(report)
    }

    /// Flushes the offline queue every time connectivity comes back.
    pub fn spawn_reconnect_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                engine.store.emit(SyncEvent::ConnectivityChanged { online });
                if !online {
                    continue;
                }
                if let Err(error) = engine.flush_pending().await {
                    error!(%error, "Reconnect sync failed");
                }
            }
            debug!("Connectivity channel closed, reconnect watcher exiting");
        })
    }
}
