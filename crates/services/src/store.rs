use std::time::Duration;

use bson::oid::ObjectId;
use chrono::NaiveDate;
use dashmap::DashMap;
use fieldtrack_db::models::{DailyAchievement, Task};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{TrackError, TrackResult};

/// Notifications for the owning application.
///
/// `TaskUpdated` fires for optimistic and confirmed mutations alike; the rest
/// are transient sync statuses and never mean data was lost.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    TaskUpdated(Task),
    Retrying {
        key: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    SavedOffline {
        key: String,
    },
    Synced {
        key: String,
    },
    UploadFailed {
        key: String,
        message: String,
    },
    DeletionMayReappear {
        key: String,
        message: String,
    },
    ConnectivityChanged {
        online: bool,
    },
}

/// In-memory snapshot store for loaded tasks.
///
/// Services never mutate a cached task in place: they build a new snapshot and
/// hand it to [`TaskStore::apply`], which swaps it in and broadcasts it.
pub struct TaskStore {
    cache: DashMap<ObjectId, Task>,
    events: broadcast::Sender<SyncEvent>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            cache: DashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("No sync event subscribers: {}", e);
        }
    }

    /// Loads a task without announcing it.
    pub fn load(&self, mut task: Task) {
        task.refresh_totals();
        self.cache.insert(task.id, task);
    }

    pub fn get(&self, id: ObjectId) -> TrackResult<Task> {
        self.cache
            .get(&id)
            .map(|t| t.clone())
            .ok_or(TrackError::TaskNotFound(id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.cache.contains_key(&id)
    }

    pub fn apply(&self, task: Task) -> Task {
        self.cache.insert(task.id, task.clone());
        self.emit(SyncEvent::TaskUpdated(task.clone()));
        task
    }

    /// Records the remote id of a saved achievement on the cached snapshot.
    ///
    /// Only the id is merged: the local record may already carry newer edits
    /// than the payload that was saved.
    pub fn merge_achievement(&self, saved: &DailyAchievement) -> Option<Task> {
        let updated = {
            let mut task = self.cache.get_mut(&saved.task_id)?;
            let local = task.achievement_mut(saved.date)?;
            if local.id == saved.id {
                return None;
            }
            local.id = saved.id;
            task.value().clone()
        };
        self.emit(SyncEvent::TaskUpdated(updated.clone()));
        Some(updated)
    }

    /// Puts back the `previous` record for `date` after a mutation the remote
    /// refused. Nothing happens if the cached day no longer matches `applied`,
    /// since a later edit has replaced it.
    pub fn restore_achievement(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        previous: Option<DailyAchievement>,
        applied: Option<&DailyAchievement>,
    ) -> Option<Task> {
        let restored = {
            let mut task = self.cache.get_mut(&task_id)?;
            if task.achievement(date) != applied {
                return None;
            }
            task.achievements.retain(|a| a.date != date);
            if let Some(previous) = previous {
                task.achievements.push(previous);
                task.achievements.sort_by_key(|a| a.date);
            }
            task.refresh_totals();
            task.value().clone()
        };
        debug!(%task_id, %date, "Reverted refused change");
        self.emit(SyncEvent::TaskUpdated(restored.clone()));
        Some(restored)
    }

    /// Folds remote records into the cached snapshot. Dates missing locally are
    /// added; dates present locally keep their content and only gain the id.
    pub fn merge_remote(&self, task_id: ObjectId, records: Vec<DailyAchievement>) -> TrackResult<Task> {
        let mut task = self.get(task_id)?;
        for record in records {
            match task.achievement_mut(record.date) {
                Some(local) => {
                    if local.id.is_none() {
                        local.id = record.id;
                    }
                }
                None => task.achievements.push(record),
            }
        }
        task.achievements.sort_by_key(|a| a.date);
        task.refresh_totals();
        Ok(self.apply(task))
    }

    pub fn remove(&self, id: ObjectId) -> Option<Task> {
        self.cache.remove(&id).map(|(_, task)| task)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
