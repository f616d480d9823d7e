use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::DailyAchievement;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Daily achievements: one durable record per (task, date)
    create_indexes(
        db,
        DailyAchievement::COLLECTION,
        vec![
            index_unique(bson::doc! { "task_id": 1, "date": 1 }),
            index(bson::doc! { "task_id": 1, "updated_at": -1 }),
        ],
    )
    .await?;

    info!("Database indexes ensured");
    Ok(())
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}
