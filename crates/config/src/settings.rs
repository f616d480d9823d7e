use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub sync: SyncSettings,
    pub media: MediaSettings,
    pub ledger: LedgerSettings,
    pub attendance: AttendanceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// Total remote attempts per save before falling back to the offline queue.
    pub max_attempts: u32,
    /// Base unit of the exponential backoff (`base * 2^attempt`).
    pub backoff_base_ms: u64,
    /// Directory holding the redb offline queue file.
    pub offline_queue_path: String,
    /// How often the daemon pings the remote store to detect reconnects.
    pub probe_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaSettings {
    pub upload_url: String,
    pub public_base_url: String,
    pub access_token: Option<String>,
    pub voice_content_type: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerSettings {
    /// Fraction of the target a task may reach before an explicit override is needed.
    pub target_tolerance: f64,
    /// Absolute sanity ceiling for a single day's value.
    pub max_value: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AttendanceSettings {
    /// Planned effort per day when the task does not define its own.
    pub default_planned_hours: f64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("FIELDTRACK"),
            )
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "fieldtrack")?
            .set_default("sync.max_attempts", 3)?
            .set_default("sync.backoff_base_ms", 1000)?
            .set_default("sync.offline_queue_path", "data/offline")?
            .set_default("sync.probe_interval_secs", 15)?
            .set_default("media.upload_url", "http://localhost:9000/fieldtrack")?
            .set_default("media.public_base_url", "http://localhost:9000/fieldtrack")?
            .set_default("media.access_token", None::<String>)?
            .set_default("media.voice_content_type", "audio/webm")?
            .set_default("ledger.target_tolerance", 1.10)?
            .set_default("ledger.max_value", 1_000_000.0)?
            .set_default("attendance.default_planned_hours", 8.0)?
            .build()?;

        config.try_deserialize()
    }
}
