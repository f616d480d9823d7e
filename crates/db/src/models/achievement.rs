use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One task's contribution for a single calendar date.
///
/// The `(task_id, date)` pair is the natural key; `id` is only known once the
/// remote store has accepted the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyAchievement {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<ObjectId>,
    pub task_id: ObjectId,
    pub date: NaiveDate,
    #[serde(default)]
    pub value: f64,
    pub work_hours: Option<f64>,
    pub overtime_hours: Option<f64>,
    pub notes: Option<String>,
    pub check_in: Option<AttendanceEvent>,
    pub check_out: Option<AttendanceEvent>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub voice_notes: Vec<VoiceNote>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A check-in or check-out, only ever built from a successful location read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceEvent {
    pub timestamp: DateTime<Utc>,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub url: String,
    pub media_type: MediaType,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    /// Local preview still waiting for its upload; never sent to the remote store.
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceNote {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

impl MediaType {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let major = content_type.split('/').next()?.trim();
        match major.to_ascii_lowercase().as_str() {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

impl DailyAchievement {
    pub const COLLECTION: &'static str = "daily_achievements";

    pub fn new(task_id: ObjectId, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            task_id,
            date,
            value: 0.0,
            work_hours: None,
            overtime_hours: None,
            notes: None,
            check_in: None,
            check_out: None,
            participants: Vec::new(),
            media: Vec::new(),
            voice_notes: Vec::new(),
            updated_at: now,
        }
    }

    pub fn slot_key(&self) -> String {
        slot_key(self.task_id, self.date)
    }

    /// Copy of the record as it may be written remotely (previews stripped).
    pub fn persistable(&self) -> Self {
        let mut record = self.clone();
        record.media.retain(|m| !m.preview);
        record
    }
}

/// Key shared by the remote uniqueness rule, the offline queue and voice sessions.
pub fn slot_key(task_id: ObjectId, date: NaiveDate) -> String {
    format!("{}:{}", task_id.to_hex(), date)
}
