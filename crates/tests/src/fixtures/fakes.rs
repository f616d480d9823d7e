//! In-memory stand-ins for the collaborators the services talk to.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fieldtrack_db::models::{DailyAchievement, GeoPoint};
use fieldtrack_services::Clock;
use fieldtrack_services::GeolocationProvider;
use fieldtrack_services::MediaStorage;
use fieldtrack_services::dao::base::{DaoError, DaoResult};
use fieldtrack_services::sync::AchievementRemote;
use tokio::sync::Notify;

/// Consumes one unit of a failure budget; `true` when a failure is due.
fn take(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Parks one insert until released.
#[derive(Clone, Default)]
pub struct InsertHold {
    /// Notified once the held insert has started.
    pub entered: Arc<Notify>,
    /// Notify to let the held insert continue.
    pub release: Arc<Notify>,
}

/// Remote store enforcing the `(task_id, date)` uniqueness rule.
#[derive(Default)]
pub struct FakeRemote {
    records: Mutex<Vec<DailyAchievement>>,
    offline: AtomicBool,
    network_failures: AtomicU32,
    stale_finds: AtomicU32,
    update_failures: AtomicU32,
    forbidden: AtomicBool,
    insert_hold: Mutex<Option<InsertHold>>,
    pub finds: AtomicU32,
    pub inserts: AtomicU32,
    pub updates: AtomicU32,
    pub deletes: AtomicU32,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a network error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The next `n` calls fail with a network error.
    pub fn fail_network(&self, n: u32) {
        self.network_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` lookups miss, as if another writer had not landed yet.
    pub fn stale_finds(&self, n: u32) {
        self.stale_finds.store(n, Ordering::SeqCst);
    }

    /// The next `n` updates fail with a network error.
    pub fn fail_updates(&self, n: u32) {
        self.update_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_forbidden(&self, forbidden: bool) {
        self.forbidden.store(forbidden, Ordering::SeqCst);
    }

    /// The next insert waits on the returned hold before it touches the records.
    pub fn hold_next_insert(&self) -> InsertHold {
        let hold = InsertHold::default();
        *self.insert_hold.lock().unwrap() = Some(hold.clone());
        hold
    }

    /// Stores a record directly, bypassing the uniqueness check.
    pub fn seed_record(&self, mut record: DailyAchievement) -> DailyAchievement {
        record.id = Some(ObjectId::new());
        self.records.lock().unwrap().push(record.clone());
        record
    }

    pub fn records(&self) -> Vec<DailyAchievement> {
        self.records.lock().unwrap().clone()
    }

    pub fn record_for(&self, task_id: ObjectId, date: NaiveDate) -> Option<DailyAchievement> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.task_id == task_id && r.date == date)
            .cloned()
    }

    pub fn count(&self, counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn gate(&self) -> DaoResult<()> {
        if self.offline.load(Ordering::SeqCst) || take(&self.network_failures) {
            return Err(DaoError::Unavailable("connection refused".to_string()));
        }
        if self.forbidden.load(Ordering::SeqCst) {
            return Err(DaoError::Forbidden("token expired".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AchievementRemote for FakeRemote {
    async fn find_by_task_and_date(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
    ) -> DaoResult<Option<DailyAchievement>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        if take(&self.stale_finds) {
            return Ok(None);
        }
        Ok(self.record_for(task_id, date))
    }

    async fn list_by_task(&self, task_id: ObjectId) -> DaoResult<Vec<DailyAchievement>> {
        self.gate()?;
        let mut records: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| r.task_id == task_id)
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn insert(&self, payload: &DailyAchievement) -> DaoResult<DailyAchievement> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let hold = self.insert_hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        self.gate()?;
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|r| r.task_id == payload.task_id && r.date == payload.date)
        {
            return Err(DaoError::DuplicateKey(payload.slot_key()));
        }
        let mut stored = payload.clone();
        stored.id = Some(ObjectId::new());
        records.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: ObjectId, payload: &DailyAchievement) -> DaoResult<DailyAchievement> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        if take(&self.update_failures) {
            return Err(DaoError::Unavailable("connection reset".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(DaoError::NotFound)?;
        *existing = DailyAchievement {
            id: Some(id),
            ..payload.clone()
        };
        Ok(existing.clone())
    }

    async fn delete(&self, id: ObjectId) -> DaoResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != Some(id));
        Ok(records.len() < before)
    }
}

pub struct FakeGeolocation {
    position: GeoPoint,
    fail: AtomicBool,
    pub reads: AtomicU32,
}

impl Default for FakeGeolocation {
    fn default() -> Self {
        Self {
            position: GeoPoint {
                latitude: -6.2088,
                longitude: 106.8456,
            },
            fail: AtomicBool::new(false),
            reads: AtomicU32::new(0),
        }
    }
}

impl FakeGeolocation {
    pub fn position(&self) -> GeoPoint {
        self.position
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GeolocationProvider for FakeGeolocation {
    async fn current_position(&self) -> anyhow::Result<GeoPoint> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("location permission denied");
        }
        Ok(self.position)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct FakeMediaStorage {
    fail: AtomicBool,
    uploads: Mutex<Vec<StoredUpload>>,
}

impl FakeMediaStorage {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<StoredUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStorage for FakeMediaStorage {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        path_hint: &str,
        content_type: &str,
    ) -> Result<String, String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("storage quota exceeded".to_string());
        }
        self.uploads.lock().unwrap().push(StoredUpload {
            path: path_hint.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(format!("https://media.test/{}", path_hint))
    }
}

/// Manually driven clock; `today()` is the UTC date of `now()`.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 08:00 UTC on the given day.
    pub fn morning_of(date: NaiveDate) -> Self {
        Self::at(Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap()))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
