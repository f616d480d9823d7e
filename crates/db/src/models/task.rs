use bson::oid::ObjectId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::achievement::DailyAchievement;

/// A unit of trackable field work with a numeric target.
///
/// `total_achieved` and `progress` are derived snapshot fields; call
/// [`Task::refresh_totals`] after touching `achievements` or `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub total_target: f64,
    pub planned_start: NaiveDate,
    pub planned_end: NaiveDate,
    pub actual_start_date: Option<NaiveDate>,
    pub actual_end_date: Option<NaiveDate>,
    pub planned_hours_per_day: Option<f64>,
    #[serde(default)]
    pub achievements: Vec<DailyAchievement>,
    #[serde(default)]
    pub total_achieved: f64,
    #[serde(default)]
    pub progress: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl Task {
    pub fn new(
        title: impl Into<String>,
        total_target: f64,
        planned_start: NaiveDate,
        planned_end: NaiveDate,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            title: title.into(),
            status: TaskStatus::Todo,
            total_target,
            planned_start,
            planned_end,
            actual_start_date: None,
            actual_end_date: None,
            planned_hours_per_day: None,
            achievements: Vec::new(),
            total_achieved: 0.0,
            progress: 0,
        }
    }

    pub fn achievement(&self, date: NaiveDate) -> Option<&DailyAchievement> {
        self.achievements.iter().find(|a| a.date == date)
    }

    pub fn achievement_mut(&mut self, date: NaiveDate) -> Option<&mut DailyAchievement> {
        self.achievements.iter_mut().find(|a| a.date == date)
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Sum of every recorded daily value.
    pub fn sum_achieved(&self) -> f64 {
        self.achievements.iter().map(|a| a.value).sum()
    }

    /// `min(100, round(achieved / target * 100))`, pinned to 100 once completed.
    pub fn computed_progress(&self) -> u8 {
        if self.is_completed() {
            return 100;
        }
        if self.total_target <= 0.0 {
            return 0;
        }
        let percent = (self.sum_achieved() / self.total_target * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }

    pub fn refresh_totals(&mut self) {
        self.total_achieved = self.sum_achieved();
        self.progress = self.computed_progress();
    }
}
