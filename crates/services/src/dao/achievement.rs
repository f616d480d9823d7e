use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use chrono::NaiveDate;
use fieldtrack_db::models::DailyAchievement;
use mongodb::Database;

use super::base::{BaseDao, DaoResult};
use crate::sync::remote::AchievementRemote;

/// MongoDB-backed remote store for daily achievements.
pub struct AchievementDao {
    pub base: BaseDao<DailyAchievement>,
}

impl AchievementDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, DailyAchievement::COLLECTION),
        }
    }
}

#[async_trait]
impl AchievementRemote for AchievementDao {
    async fn find_by_task_and_date(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
    ) -> DaoResult<Option<DailyAchievement>> {
        self.base
            .find_one(doc! { "task_id": task_id, "date": date.to_string() })
            .await
    }

    async fn list_by_task(&self, task_id: ObjectId) -> DaoResult<Vec<DailyAchievement>> {
        self.base
            .find_many(doc! { "task_id": task_id }, Some(doc! { "date": 1 }))
            .await
    }

    async fn insert(&self, payload: &DailyAchievement) -> DaoResult<DailyAchievement> {
        let mut record = payload.clone();
        record.id = None;
        let id = self.base.insert_one(&record).await?;
        self.base.find_by_id(id).await
    }

    async fn update(&self, id: ObjectId, payload: &DailyAchievement) -> DaoResult<DailyAchievement> {
        let mut record = payload.clone();
        record.id = None;
        let fields = bson::to_document(&record)?;
        self.base.update_by_id(id, doc! { "$set": fields }).await?;
        self.base.find_by_id(id).await
    }

    async fn delete(&self, id: ObjectId) -> DaoResult<bool> {
        let deleted = self.base.hard_delete(doc! { "_id": id }).await?;
        Ok(deleted > 0)
    }
}
