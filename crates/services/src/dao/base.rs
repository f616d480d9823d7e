use bson::{doc, oid::ObjectId, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
    #[error("Entity not found")]
    NotFound,
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

pub type DaoResult<T> = Result<T, DaoError>;

/// Coarse classification that drives the sync engine's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Network,
    DuplicateKey,
    Authorization,
    Validation,
    NotFound,
    Other,
}

impl DaoError {
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            DaoError::Unavailable(_) => RemoteErrorKind::Network,
            DaoError::DuplicateKey(_) => RemoteErrorKind::DuplicateKey,
            DaoError::Forbidden(_) => RemoteErrorKind::Authorization,
            DaoError::Validation(_) => RemoteErrorKind::Validation,
            DaoError::NotFound => RemoteErrorKind::NotFound,
            DaoError::Mongo(e) => classify_mongo(e),
            DaoError::BsonSer(_) | DaoError::BsonDe(_) => RemoteErrorKind::Other,
        }
    }
}

fn classify_mongo(error: &mongodb::error::Error) -> RemoteErrorKind {
    match *error.kind {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => RemoteErrorKind::Network,
        ErrorKind::Authentication { .. } => RemoteErrorKind::Authorization,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == DUPLICATE_KEY_CODE =>
        {
            RemoteErrorKind::DuplicateKey
        }
        _ if error.contains_label("RetryableWriteError") => RemoteErrorKind::Network,
        _ => RemoteErrorKind::Other,
    }
}

pub struct BaseDao<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Unpin + Send + Sync,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<T>(collection_name),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_one(&self, filter: Document) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> DaoResult<Vec<T>> {
        let mut cursor = if let Some(sort) = sort {
            self.collection
                .find(filter)
                .sort(sort)
                .await?
        } else {
            self.collection.find(filter).await?
        };

        let mut results = Vec::new();
        use futures::TryStreamExt;
        while let Some(doc) = cursor.try_next().await? {
            results.push(doc);
        }
        Ok(results)
    }

    pub async fn insert_one(&self, doc: &T) -> DaoResult<ObjectId> {
        let result = self.collection.insert_one(doc).await.map_err(|e| {
            if let ErrorKind::Write(WriteFailure::WriteError(ref write_error)) = *e.kind {
                if write_error.code == DUPLICATE_KEY_CODE {
                    return DaoError::DuplicateKey(write_error.message.clone());
                }
            }
            DaoError::Mongo(e)
        })?;

        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DaoError::Validation("inserted_id is not an ObjectId".to_string()))?;
        debug!(?id, "Inserted document");
        Ok(id)
    }

    /// Applies `update` to the matching document; `NotFound` when nothing matched.
    pub async fn update_one(&self, filter: Document, update: Document) -> DaoResult<()> {
        let result = self.collection.update_one(filter, update).await.map_err(|e| {
            if let ErrorKind::Write(WriteFailure::WriteError(ref write_error)) = *e.kind {
                if write_error.code == DUPLICATE_KEY_CODE {
                    return DaoError::DuplicateKey(write_error.message.clone());
                }
            }
            DaoError::Mongo(e)
        })?;

        if result.matched_count == 0 {
            return Err(DaoError::NotFound);
        }
        Ok(())
    }

    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> DaoResult<()> {
        self.update_one(doc! { "_id": id }, update).await
    }

    pub async fn hard_delete(&self, filter: Document) -> DaoResult<u64> {
        let result = self.collection.delete_many(filter).await?;
        Ok(result.deleted_count)
    }
}
