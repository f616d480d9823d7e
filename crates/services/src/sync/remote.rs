use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::NaiveDate;
use fieldtrack_db::models::DailyAchievement;

use crate::dao::base::DaoResult;

/// Remote persistence for achievement records.
///
/// Implementations must report failures through [`DaoError`](crate::dao::base::DaoError)
/// so the sync engine can tell network, duplicate-key, authorization and
/// validation failures apart.
#[async_trait]
pub trait AchievementRemote: Send + Sync + 'static {
    async fn find_by_task_and_date(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
    ) -> DaoResult<Option<DailyAchievement>>;

    async fn list_by_task(&self, task_id: ObjectId) -> DaoResult<Vec<DailyAchievement>>;

    /// Inserts a new record and returns it with its assigned id.
    async fn insert(&self, payload: &DailyAchievement) -> DaoResult<DailyAchievement>;

    /// Replaces the record stored under `id`.
    async fn update(&self, id: ObjectId, payload: &DailyAchievement) -> DaoResult<DailyAchievement>;

    async fn delete(&self, id: ObjectId) -> DaoResult<bool>;
}
