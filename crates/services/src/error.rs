use bson::oid::ObjectId;
use thiserror::Error;

use crate::dao::base::{DaoError, RemoteErrorKind};
use crate::sync::offline_queue::QueueError;

/// Error taxonomy surfaced to callers of the tracking services.
///
/// `Validation`, `Precondition` and `Authorization` are raised locally before any
/// remote call; `Network` only escapes when offline queueing itself is impossible.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Not authorized: {0}")]
    Authorization(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Task not found: {0}")]
    TaskNotFound(ObjectId),
    #[error("Geolocation unavailable: {0}")]
    Geolocation(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Offline queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Remote store error: {0}")]
    Remote(String),
}

pub type TrackResult<T> = Result<T, TrackError>;

impl TrackError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackError::Network(_))
    }
}

impl From<DaoError> for TrackError {
    fn from(err: DaoError) -> Self {
        let message = err.to_string();
        match err.kind() {
            RemoteErrorKind::Network => TrackError::Network(message),
            RemoteErrorKind::DuplicateKey => TrackError::Conflict(message),
            RemoteErrorKind::Authorization => TrackError::Authorization(message),
            RemoteErrorKind::Validation => TrackError::Validation(message),
            RemoteErrorKind::NotFound | RemoteErrorKind::Other => TrackError::Remote(message),
        }
    }
}
