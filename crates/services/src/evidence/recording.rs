use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use fieldtrack_db::models::slot_key;

use crate::error::{TrackError, TrackResult};

/// Audio captured for one achievement slot.
///
/// Chunks are accumulated in arrival order and concatenated on finish, so two
/// sessions for different dates never share a buffer.
#[derive(Debug)]
pub struct RecordingSession {
    task_id: ObjectId,
    date: NaiveDate,
    started_at: DateTime<Utc>,
    chunks: Vec<Vec<u8>>,
    active: bool,
}

impl RecordingSession {
    pub fn new(task_id: ObjectId, date: NaiveDate, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            date,
            started_at,
            chunks: Vec::new(),
            active: true,
        }
    }

    pub fn slot(&self) -> String {
        slot_key(self.task_id, self.date)
    }

    pub fn task_id(&self) -> ObjectId {
        self.task_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn push(&mut self, chunk: Vec<u8>) -> TrackResult<()> {
        if !self.active {
            return Err(TrackError::Precondition(format!(
                "recording for {} has already stopped",
                self.slot()
            )));
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// Copy of the captured audio; the session stays usable.
    pub fn audio(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

/// Recording sessions keyed by slot (`task:date`).
#[derive(Debug, Default)]
pub struct RecordingSessions {
    sessions: DashMap<String, RecordingSession>,
}

impl RecordingSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, task_id: ObjectId, date: NaiveDate, now: DateTime<Utc>) -> TrackResult<()> {
        let key = slot_key(task_id, date);
        if self.sessions.contains_key(&key) {
            return Err(TrackError::Precondition(format!(
                "a voice note is already being recorded for {key}"
            )));
        }
        self.sessions
            .insert(key, RecordingSession::new(task_id, date, now));
        Ok(())
    }

    /// Appends a chunk; returns the bytes captured so far.
    pub fn push(&self, task_id: ObjectId, date: NaiveDate, chunk: Vec<u8>) -> TrackResult<usize> {
        let key = slot_key(task_id, date);
        let mut session = self
            .sessions
            .get_mut(&key)
            .ok_or_else(|| TrackError::Precondition(format!("no voice recording for {key}")))?;
        session.push(chunk)?;
        Ok(session.total_bytes())
    }

    /// Stops and takes ownership of the slot's session.
    pub fn finish(&self, task_id: ObjectId, date: NaiveDate) -> TrackResult<RecordingSession> {
        let key = slot_key(task_id, date);
        let (_, mut session) = self
            .sessions
            .remove(&key)
            .ok_or_else(|| TrackError::Precondition(format!("no voice recording for {key}")))?;
        session.stop();
        Ok(session)
    }

    /// Puts a finished session back, e.g. after its upload failed.
    pub fn restore(&self, session: RecordingSession) {
        self.sessions.insert(session.slot(), session);
    }

    pub fn cancel(&self, task_id: ObjectId, date: NaiveDate) -> bool {
        self.sessions.remove(&slot_key(task_id, date)).is_some()
    }

    pub fn is_recording(&self, task_id: ObjectId, date: NaiveDate) -> bool {
        self.sessions
            .get(&slot_key(task_id, date))
            .is_some_and(|s| s.is_active())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
