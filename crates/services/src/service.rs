use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::NaiveDate;
use fieldtrack_db::models::{AttendanceEvent, GeoPoint, Task};
use tracing::{info, warn};

use crate::attendance::{
    self, AttendanceState, GeolocationProvider, WorkSummary, apply_check_in, apply_check_out,
    ensure_can_check_in, ensure_can_check_out,
};
use crate::clock::Clock;
use crate::error::{TrackError, TrackResult};
use crate::ledger::{
    self, AchievementDetails, ConfirmationRequired, LedgerDecision, LedgerRules, OverrideConsent,
};
use crate::risk::{self, RiskLevel, RiskReport};
use crate::store::{SyncEvent, TaskStore};
use crate::sync::{Recorded, SaveOutcome, SyncEngine};

/// Permission bits granted by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub edit_achievements: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            edit_achievements: true,
        }
    }
}

impl Capabilities {
    pub fn read_only() -> Self {
        Self {
            edit_achievements: false,
        }
    }

    pub fn ensure_can_edit(&self) -> TrackResult<()> {
        if !self.edit_achievements {
            return Err(TrackError::Authorization(
                "editing achievements is not permitted".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueOutcome {
    Recorded(Recorded),
    /// Nothing was changed; ask the user and call again with consent.
    NeedsConfirmation(ConfirmationRequired),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckedOut {
    pub task: Task,
    pub summary: WorkSummary,
    pub save: SaveOutcome,
}

/// Ledger, lifecycle and attendance operations over cached task snapshots.
pub struct AchievementService {
    store: Arc<TaskStore>,
    sync: Arc<SyncEngine>,
    geolocation: Arc<dyn GeolocationProvider>,
    clock: Arc<dyn Clock>,
    rules: LedgerRules,
    default_planned_hours: f64,
    capabilities: Capabilities,
}

impl AchievementService {
    pub fn new(
        sync: Arc<SyncEngine>,
        geolocation: Arc<dyn GeolocationProvider>,
        clock: Arc<dyn Clock>,
        rules: LedgerRules,
        default_planned_hours: f64,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            store: Arc::clone(sync.store()),
            sync,
            geolocation,
            clock,
            rules,
            default_planned_hours,
            capabilities,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub async fn record_value(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        value: f64,
        consent: OverrideConsent,
    ) -> TrackResult<ValueOutcome> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        match ledger::record_value(&task, date, value, consent, &self.rules, self.clock.now())? {
            LedgerDecision::NeedsConfirmation(required) => {
                info!(
                    %task_id,
                    %date,
                    projected = required.projected_total,
                    allowed = required.allowed_total,
                    "Value exceeds tolerated target, confirmation required"
                );
                Ok(ValueOutcome::NeedsConfirmation(required))
            }
            LedgerDecision::Apply(next) => {
                if consent == OverrideConsent::Granted {
                    warn!(%task_id, %date, value, "Recording value with target override");
                }
                Ok(ValueOutcome::Recorded(self.sync.commit(next, date).await?))
            }
        }
    }

    pub async fn record_details(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        details: AchievementDetails,
    ) -> TrackResult<Recorded> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        let next = ledger::record_details(&task, date, details, self.clock.now())?;
        self.sync.commit(next, date).await
    }

    /// Confirmed delete of a whole day. The snapshot drops the day first; if
    /// the remote delete fails the record may come back on the next hydrate.
    pub async fn delete_achievement(&self, task_id: ObjectId, date: NaiveDate) -> TrackResult<Task> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        let (next, removed) = ledger::remove_achievement(&task, date)?;
        let next = self.store.apply(next);

        if let Err(err) = self.sync.delete(&removed).await {
            let key = removed.slot_key();
            warn!(%key, error = %err, "Remote delete failed");
            self.store.restore_achievement(task_id, date, Some(removed), None);
            self.store.emit(SyncEvent::DeletionMayReappear {
                key,
                message: err.to_string(),
            });
            return Err(err);
        }
        Ok(next)
    }

    pub fn start_task(&self, task_id: ObjectId) -> TrackResult<Task> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        let next = ledger::start_task(&task, self.clock.today())?;
        info!(%task_id, "Task started");
        Ok(self.store.apply(next))
    }

    pub fn end_task(&self, task_id: ObjectId) -> TrackResult<Task> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        let next = ledger::end_task(&task, self.clock.today())?;
        info!(%task_id, "Task completed");
        Ok(self.store.apply(next))
    }

    pub async fn check_in(
        &self,
        task_id: ObjectId,
        date: NaiveDate,
        participants: Vec<String>,
    ) -> TrackResult<Recorded> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        ensure_can_check_in(&task, date, self.clock.today(), &participants)?;

        let location = self.locate().await?;

        // The snapshot may have moved while the position was being read.
        let task = self.store.get(task_id)?;
        ensure_can_check_in(&task, date, self.clock.today(), &participants)?;
        let event = AttendanceEvent {
            timestamp: self.clock.now(),
            location,
        };
        let next = apply_check_in(&task, date, event, participants);
        info!(%task_id, %date, "Checked in");
        self.sync.commit(next, date).await
    }

    pub async fn check_out(&self, task_id: ObjectId, date: NaiveDate) -> TrackResult<CheckedOut> {
        self.capabilities.ensure_can_edit()?;
        let task = self.store.get(task_id)?;
        ensure_can_check_out(&task, date, self.clock.today())?;

        let location = self.locate().await?;

        let task = self.store.get(task_id)?;
        ensure_can_check_out(&task, date, self.clock.today())?;
        let planned = task
            .planned_hours_per_day
            .unwrap_or(self.default_planned_hours);
        let event = AttendanceEvent {
            timestamp: self.clock.now(),
            location,
        };
        let (next, summary) = apply_check_out(&task, date, event, planned)?;
        info!(
            %task_id,
            %date,
            work_hours = summary.work_hours,
            overtime_hours = summary.overtime_hours,
            "Checked out"
        );

        let Recorded { task, save } = self.sync.commit(next, date).await?;
        Ok(CheckedOut {
            task,
            summary,
            save,
        })
    }

    async fn locate(&self) -> TrackResult<GeoPoint> {
        self.geolocation.current_position().await.map_err(|e| {
            warn!(error = %e, "Could not read device position");
            TrackError::Geolocation(format!("{:#}", e))
        })
    }

    pub fn attendance_state(&self, task_id: ObjectId, date: NaiveDate) -> TrackResult<AttendanceState> {
        let task = self.store.get(task_id)?;
        Ok(attendance::attendance_state(task.achievement(date)))
    }

    pub fn risk_level(&self, task_id: ObjectId) -> TrackResult<RiskLevel> {
        let task = self.store.get(task_id)?;
        Ok(risk::risk_level(&task, self.clock.today()))
    }

    pub fn risk_report(&self, task_id: ObjectId) -> TrackResult<RiskReport> {
        let task = self.store.get(task_id)?;
        Ok(risk::risk_report(&task, self.clock.today()))
    }

    pub async fn hydrate(&self, task_id: ObjectId) -> TrackResult<Task> {
        self.sync.hydrate(task_id).await
    }
}
