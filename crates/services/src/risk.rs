use chrono::NaiveDate;
use fieldtrack_db::models::Task;
use serde::Serialize;

/// Schedule-adherence risk, recomputed on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskReport {
    pub level: RiskLevel,
    pub expected_progress: f64,
    pub actual_progress: f64,
}

pub fn risk_level(task: &Task, as_of: NaiveDate) -> RiskLevel {
    risk_report(task, as_of).level
}

pub fn risk_report(task: &Task, as_of: NaiveDate) -> RiskReport {
    let expected_progress = expected_progress(task, as_of);
    let actual_progress = f64::from(task.computed_progress());

    let level = if as_of > task.planned_end && !task.is_completed() {
        RiskLevel::Critical
    } else if actual_progress < expected_progress - 20.0 {
        RiskLevel::High
    } else if actual_progress < expected_progress - 10.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskReport {
        level,
        expected_progress,
        actual_progress,
    }
}

/// Share of the planned window elapsed at `as_of`, as a percentage.
pub fn expected_progress(task: &Task, as_of: NaiveDate) -> f64 {
    let total_days = (task.planned_end - task.planned_start).num_days();
    if total_days <= 0 {
        return if as_of >= task.planned_start { 100.0 } else { 0.0 };
    }
    let elapsed = (as_of - task.planned_start).num_days().clamp(0, total_days);
    elapsed as f64 / total_days as f64 * 100.0
}
