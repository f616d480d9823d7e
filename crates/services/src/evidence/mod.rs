pub mod http;
pub mod recording;

pub use http::HttpMediaStorage;
pub use recording::{RecordingSession, RecordingSessions};

use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, Utc};
use fieldtrack_db::models::{MediaItem, MediaType, Task, VoiceNote, slot_key};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{TrackError, TrackResult};
use crate::ledger::upsert_achievement;
use crate::service::Capabilities;
use crate::store::{SyncEvent, TaskStore};
use crate::sync::{Recorded, SyncEngine};

/// Blob storage for evidence files: store bytes, get back a public URL.
#[async_trait]
pub trait MediaStorage: Send + Sync + 'static {
    fn provider_name(&self) -> &str;
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path_hint: &str,
        content_type: &str,
    ) -> Result<String, String>;
}

/// A photo or video picked by the user.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Attaches and detaches media and voice notes on daily achievements.
///
/// Attachments never touch `value`, so saving them cannot push a task past
/// its target tolerance.
pub struct EvidenceService {
    store: Arc<TaskStore>,
    sync: Arc<SyncEngine>,
    media: Arc<dyn MediaStorage>,
    clock: Arc<dyn Clock>,
    sessions: RecordingSessions,
    voice_content_type: String,
    capabilities: Capabilities,
}

impl EvidenceService {
    pub fn new(
        sync: Arc<SyncEngine>,
        media: Arc<dyn MediaStorage>,
        clock: Arc<dyn Clock>,
        voice_content_type: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            store: Arc::clone(sync.store()),
            sync,
            media,
            clock,
            sessions: RecordingSessions::new(),
            voice_content_type: voice_content_type.into(),
            capabilities,
        }
    }

    pub fn sessions(&self) -> &RecordingSessions {
        &self.sessions
    }

    /// Shows a local preview right away, uploads the file, then persists the
    /// achievement with the uploaded URL in place of the preview.
    ///
    /// A failed upload leaves the preview in the cached snapshot only; it is
    /// stripped from every remote write.
    pub async fn attach_media(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        upload: MediaUpload,
    ) -> TrackResult<Recorded> {
        self.capabilities.ensure_can_edit()?;
        let media_type = MediaType::from_content_type(&upload.content_type).ok_or_else(|| {
            TrackError::Validation(format!(
                "unsupported media type {}; only images and videos can be attached",
                upload.content_type
            ))
        })?;
        if upload.bytes.is_empty() {
            return Err(TrackError::Validation(format!("{} is empty", upload.file_name)));
        }

        let task = self.store.get(task_id)?;
        let now = self.clock.now();
        let preview = MediaItem {
            url: format!("preview://{}", upload.file_name),
            media_type,
            size: upload.bytes.len() as u64,
            timestamp: now,
            preview: true,
        };
        let previewed = upsert_achievement(&task, date, now, |a| a.media.push(preview.clone()));
        self.store.apply(previewed);

        let key = slot_key(task_id, date);
        let path = path_hint(task_id, date, &upload.file_name);
        let url = match self
            .media
            .upload(upload.bytes, &path, &upload.content_type)
            .await
        {
            Ok(url) => url,
            Err(message) => {
                warn!(%key, provider = self.media.provider_name(), error = %message, "Media upload failed");
                self.store.emit(SyncEvent::UploadFailed {
                    key,
                    message: message.clone(),
                });
                return Err(TrackError::Upload(message));
            }
        };
        info!(%key, %url, "Media uploaded");

        // Re-read: other edits may have landed while the upload was in flight.
        let current = self.store.get(task_id)?;
        let next = upsert_achievement(&current, date, self.clock.now(), |a| {
            match a
                .media
                .iter_mut()
                .find(|m| m.preview && m.timestamp == preview.timestamp && m.url == preview.url)
            {
                Some(item) => {
                    item.url = url;
                    item.preview = false;
                }
                None => a.media.push(MediaItem {
                    url,
                    preview: false,
                    ..preview
                }),
            }
        });
        self.sync.commit(next, date).await
    }

    /// Removes exactly the media item captured at `timestamp`.
    pub async fn detach_media(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        timestamp: DateTime<Utc>,
    ) -> TrackResult<Recorded> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        let found = task
            .achievement(date)
            .is_some_and(|a| a.media.iter().any(|m| m.timestamp == timestamp));
        if !found {
            return Err(TrackError::Precondition(format!(
                "no media item at {timestamp} on {date}"
            )));
        }

        let next = upsert_achievement(&task, date, self.clock.now(), |a| {
            if let Some(pos) = a.media.iter().position(|m| m.timestamp == timestamp) {
                a.media.remove(pos);
            }
        });
        self.commit_removal(next, date).await
    }

    /// Removes exactly the voice note recorded at `timestamp`.
    pub async fn detach_voice_note(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        timestamp: DateTime<Utc>,
    ) -> TrackResult<Recorded> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        let found = task
            .achievement(date)
            .is_some_and(|a| a.voice_notes.iter().any(|v| v.timestamp == timestamp));
        if !found {
            return Err(TrackError::Precondition(format!(
                "no voice note at {timestamp} on {date}"
            )));
        }

        let next = upsert_achievement(&task, date, self.clock.now(), |a| {
            if let Some(pos) = a.voice_notes.iter().position(|v| v.timestamp == timestamp) {
                a.voice_notes.remove(pos);
            }
        });
        self.commit_removal(next, date).await
    }

    async fn commit_removal(&self, next: Task, date: NaiveDate) -> TrackResult<Recorded> {
        let key = slot_key(next.id, date);
        match self.sync.commit(next, date).await {
            Ok(recorded) => Ok(recorded),
            Err(err) => {
                warn!(%key, error = %err, "Evidence removal not persisted");
                self.store.emit(SyncEvent::DeletionMayReappear {
                    key,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub fn start_voice_note(&self, task_id: ObjectId, date: NaiveDate) -> TrackResult<()> {
        self.capabilities.ensure_can_edit()?;
        if !self.store.contains(task_id) {
            return Err(TrackError::TaskNotFound(task_id));
        }
        self.sessions.start(task_id, date, self.clock.now())
    }

    pub fn push_voice_chunk(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        chunk: Vec<u8>,
    ) -> TrackResult<usize> {
        self.sessions.push(task_id, date, chunk)
    }

    pub fn cancel_voice_note(&self, task_id: ObjectId, date: NaiveDate) -> bool {
        self.sessions.cancel(task_id, date)
    }

    /// Stops the recording, uploads the audio and attaches it as a voice note.
    ///
    /// When the upload fails the stopped session is kept, so finishing can be
    /// retried without re-recording.
    pub async fn finish_voice_note(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
    ) -> TrackResult<Recorded> {
        self.capabilities.ensure_can_edit()?;
        let session = self.sessions.finish(task_id, date)?;
        let audio = session.audio();
        if audio.is_empty() {
            return Err(TrackError::Validation("voice note is empty".to_string()));
        }

        let key = session.slot();
        let size = audio.len() as u64;
        let file_name = format!("voice-{}.webm", session.started_at().timestamp_millis());
        let path = path_hint(task_id, date, &file_name);

        let url = match self
            .media
            .upload(audio, &path, &self.voice_content_type)
            .await
        {
            Ok(url) => url,
            Err(message) => {
                warn!(%key, error = %message, "Voice note upload failed");
                self.sessions.restore(session);
                self.store.emit(SyncEvent::UploadFailed {
                    key,
                    message: message.clone(),
                });
                return Err(TrackError::Upload(message));
            }
        };

        let task = self.store.get(task_id)?;
        let now = self.clock.now();
        let next = upsert_achievement(&task, date, now, |a| {
            a.voice_notes.push(VoiceNote {
                url,
                timestamp: now,
                size,
            })
        });
        info!(%key, size, "Voice note attached");
        self.sync.commit(next, date).await
    }
}

fn path_hint(task_id: ObjectId, date: NaiveDate, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "achievements/{}/{}/{}-{}",
        task_id.to_hex(),
        date,
        uuid::Uuid::new_v4(),
        safe
    )
}
