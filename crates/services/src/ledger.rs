//! Daily achievement ledger.
//!
//! Every operation takes an immutable [`Task`] snapshot and returns a new one
//! with `total_achieved` and `progress` recomputed; applying the snapshot is
//! the task store's job.

use chrono::{DateTime, NaiveDate, Utc};
use fieldtrack_config::settings::LedgerSettings;
use fieldtrack_db::models::{DailyAchievement, Task, TaskStatus};

use crate::error::{TrackError, TrackResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerRules {
    pub target_tolerance: f64,
    pub max_value: f64,
}

impl Default for LedgerRules {
    fn default() -> Self {
        Self {
            target_tolerance: 1.10,
            max_value: 1_000_000.0,
        }
    }
}

impl From<&LedgerSettings> for LedgerRules {
    fn from(settings: &LedgerSettings) -> Self {
        Self {
            target_tolerance: settings.target_tolerance,
            max_value: settings.max_value,
        }
    }
}

/// Whether the caller has explicitly agreed to exceed the tolerated target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideConsent {
    #[default]
    NotGiven,
    Granted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationRequired {
    /// Task total if the value were committed.
    pub projected_total: f64,
    /// Highest total reachable without consent (`target * tolerance`).
    pub allowed_total: f64,
    /// Largest value this date could take without consent.
    pub headroom: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerDecision {
    Apply(Task),
    NeedsConfirmation(ConfirmationRequired),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementDetails {
    /// `None` keeps the current notes; `Some("")` clears them.
    pub notes: Option<String>,
    pub work_hours: Option<f64>,
}

pub fn validate_value(value: f64, rules: &LedgerRules) -> TrackResult<()> {
    if !value.is_finite() {
        return Err(TrackError::Validation("value must be a finite number".to_string()));
    }
    if value < 0.0 {
        return Err(TrackError::Validation("value cannot be negative".to_string()));
    }
    if value > rules.max_value {
        return Err(TrackError::Validation(format!(
            "value {} exceeds the ceiling of {}",
            value, rules.max_value
        )));
    }
    Ok(())
}

/// Records `value` for `date`, replacing whatever that date held before.
pub fn record_value(
    task: &Task,
    date: NaiveDate,
    value: f64,
    consent: OverrideConsent,
    rules: &LedgerRules,
    now: DateTime<Utc>,
) -> TrackResult<LedgerDecision> {
    validate_value(value, rules)?;

    let previous = task.achievement(date).map(|a| a.value).unwrap_or(0.0);
    let others = task.sum_achieved() - previous;
    let projected_total = others + value;
    let allowed_total = task.total_target * rules.target_tolerance;

    if projected_total > allowed_total && consent != OverrideConsent::Granted {
        return Ok(LedgerDecision::NeedsConfirmation(ConfirmationRequired {
            projected_total,
            allowed_total,
            headroom: (allowed_total - others).max(0.0),
        }));
    }

    Ok(LedgerDecision::Apply(upsert_achievement(task, date, now, |a| {
        a.value = value;
    })))
}

/// Returns a copy of `task` with `mutate` applied to the achievement for `date`,
/// creating the achievement first when the date has none.
pub fn upsert_achievement<F>(task: &Task, date: NaiveDate, now: DateTime<Utc>, mutate: F) -> Task
where
    F: FnOnce(&mut DailyAchievement),
{
    let mut next = task.clone();
    if next.achievement(date).is_none() {
        next.achievements.push(DailyAchievement::new(task.id, date, now));
        next.achievements.sort_by_key(|a| a.date);
    }
    if let Some(achievement) = next.achievement_mut(date) {
        mutate(achievement);
        achievement.updated_at = now;
    }
    next.refresh_totals();
    next
}

pub fn record_details(
    task: &Task,
    date: NaiveDate,
    details: AchievementDetails,
    now: DateTime<Utc>,
) -> TrackResult<Task> {
    if let Some(hours) = details.work_hours {
        if !hours.is_finite() || !(0.0..=24.0).contains(&hours) {
            return Err(TrackError::Validation(
                "work hours must be between 0 and 24".to_string(),
            ));
        }
        if task.achievement(date).is_some_and(|a| a.check_out.is_some()) {
            return Err(TrackError::Precondition(
                "work hours are derived from attendance once checked out".to_string(),
            ));
        }
    }

    // `None` leaves the notes alone; a blank string clears them.
    let notes = details.notes.map(|n| {
        let trimmed = n.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(upsert_achievement(task, date, now, |a| {
        if let Some(notes) = notes {
            a.notes = notes;
        }
        if details.work_hours.is_some() {
            a.work_hours = details.work_hours;
        }
    }))
}

/// Drops the achievement for `date`; the caller is expected to have confirmed.
pub fn remove_achievement(task: &Task, date: NaiveDate) -> TrackResult<(Task, DailyAchievement)> {
    let mut next = task.clone();
    let position = next
        .achievements
        .iter()
        .position(|a| a.date == date)
        .ok_or_else(|| TrackError::Precondition(format!("no achievement recorded for {date}")))?;
    let removed = next.achievements.remove(position);
    next.refresh_totals();
    Ok((next, removed))
}

pub fn start_task(task: &Task, today: NaiveDate) -> TrackResult<Task> {
    if task.status != TaskStatus::Todo {
        return Err(TrackError::Precondition(format!(
            "task {} has already been started",
            task.id
        )));
    }
    let mut next = task.clone();
    next.status = TaskStatus::InProgress;
    next.actual_start_date = Some(today);
    next.refresh_totals();
    Ok(next)
}

pub fn end_task(task: &Task, today: NaiveDate) -> TrackResult<Task> {
    if task.status != TaskStatus::InProgress {
        return Err(TrackError::Precondition(format!(
            "task {} must be in progress to be ended",
            task.id
        )));
    }
    let mut next = task.clone();
    next.status = TaskStatus::Completed;
    next.actual_end_date = Some(today);
    next.refresh_totals();
    Ok(next)
}
