pub mod attendance;
pub mod clock;
pub mod dao;
pub mod error;
pub mod evidence;
pub mod ledger;
pub mod risk;
pub mod service;
pub mod store;
pub mod sync;

pub use attendance::{AttendanceState, GeolocationProvider, WorkSummary};
pub use clock::{Clock, SystemClock};
pub use dao::*;
pub use error::{TrackError, TrackResult};
pub use evidence::{EvidenceService, HttpMediaStorage, MediaStorage, MediaUpload};
pub use ledger::{AchievementDetails, ConfirmationRequired, LedgerDecision, LedgerRules, OverrideConsent};
pub use risk::{RiskLevel, RiskReport};
pub use service::{AchievementService, Capabilities, CheckedOut, ValueOutcome};
pub use store::{SyncEvent, TaskStore};
pub use sync::{FlushReport, Recorded, SaveOutcome, SyncEngine};
