//! Check-in/check-out sessions per task and calendar date.
//!
//! The guards and snapshot builders here are synchronous; the service layer
//! reads the device position in between, so a failed location read never
//! leaves a half-recorded session behind.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fieldtrack_db::models::{AttendanceEvent, DailyAchievement, GeoPoint, Task};
use serde::Serialize;

use crate::error::{TrackError, TrackResult};
use crate::ledger::upsert_achievement;

/// Device position source (GPS, browser API, fixed site coordinates in tests).
#[async_trait]
pub trait GeolocationProvider: Send + Sync + 'static {
    async fn current_position(&self) -> anyhow::Result<GeoPoint>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    NoSession,
    CheckedIn,
    CheckedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkSummary {
    pub work_hours: f64,
    pub overtime_hours: f64,
}

pub fn attendance_state(achievement: Option<&DailyAchievement>) -> AttendanceState {
    match achievement {
        Some(a) if a.check_out.is_some() => AttendanceState::CheckedOut,
        Some(a) if a.check_in.is_some() => AttendanceState::CheckedIn,
        _ => AttendanceState::NoSession,
    }
}

pub fn work_summary(
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    planned_hours: f64,
) -> WorkSummary {
    let work_hours = (check_out - check_in).num_milliseconds() as f64 / 3_600_000.0;
    WorkSummary {
        work_hours,
        overtime_hours: (work_hours - planned_hours).max(0.0),
    }
}

fn ensure_today(date: NaiveDate, today: NaiveDate) -> TrackResult<()> {
    if date != today {
        return Err(TrackError::Precondition(format!(
            "attendance can only be recorded for today ({today}), not {date}"
        )));
    }
    Ok(())
}

pub fn ensure_can_check_in(
    task: &Task,
    date: NaiveDate,
    today: NaiveDate,
    participants: &[String],
) -> TrackResult<()> {
    if task.actual_start_date.is_none() {
        return Err(TrackError::Precondition(
            "task must be started before checking in".to_string(),
        ));
    }
    if participants.is_empty() {
        return Err(TrackError::Precondition(
            "select at least one participating member".to_string(),
        ));
    }
    ensure_today(date, today)?;
    match attendance_state(task.achievement(date)) {
        AttendanceState::NoSession => Ok(()),
        AttendanceState::CheckedIn => Err(TrackError::Precondition(format!(
            "already checked in on {date}"
        ))),
        AttendanceState::CheckedOut => Err(TrackError::Precondition(format!(
            "attendance for {date} is already closed"
        ))),
    }
}

pub fn ensure_can_check_out(task: &Task, date: NaiveDate, today: NaiveDate) -> TrackResult<()> {
    ensure_today(date, today)?;
    match attendance_state(task.achievement(date)) {
        AttendanceState::CheckedIn => Ok(()),
        AttendanceState::NoSession => Err(TrackError::Precondition(format!(
            "no check-in recorded for {date}"
        ))),
        AttendanceState::CheckedOut => Err(TrackError::Precondition(format!(
            "already checked out on {date}"
        ))),
    }
}

pub fn apply_check_in(
    task: &Task,
    date: NaiveDate,
    event: AttendanceEvent,
    participants: Vec<String>,
) -> Task {
    let now = event.timestamp;
    upsert_achievement(task, date, now, |a| {
        a.check_in = Some(event);
        a.participants = participants;
    })
}

/// Closes the session; the caller must have passed [`ensure_can_check_out`].
pub fn apply_check_out(
    task: &Task,
    date: NaiveDate,
    event: AttendanceEvent,
    planned_hours: f64,
) -> TrackResult<(Task, WorkSummary)> {
    let check_in = task
        .achievement(date)
        .and_then(|a| a.check_in.as_ref())
        .map(|e| e.timestamp)
        .ok_or_else(|| TrackError::Precondition(format!("no check-in recorded for {date}")))?;

    let summary = work_summary(check_in, event.timestamp, planned_hours);
    let now = event.timestamp;
    let next = upsert_achievement(task, date, now, |a| {
        a.check_out = Some(event);
        a.work_hours = Some(summary.work_hours);
        a.overtime_hours = Some(summary.overtime_hours);
    });
    Ok((next, summary))
}
