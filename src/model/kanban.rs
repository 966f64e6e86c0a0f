use std::{fmt::Display, num::NonZeroU32, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{
    percentage::{seconds_percentage, Percentage},
    time::whole_seconds_between,
};

use super::collections::Priority;

pub type TaskId = u64;

pub const DEFAULT_ESTIMATE_MINUTES: u32 = 30;

/// Progress at which a running timer is shown as a warning.
pub const WARNING_PERCENT: f64 = 80.;
/// Progress at which a running timer is shown as overdue.
pub const DANGER_PERCENT: f64 = 100.;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus {
    /// Column order of the board: pending, in progress, done, then back to pending.
    pub fn next(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Pending,
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in progress"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "todo" => Ok(TaskStatus::Pending),
            "progress" | "in-progress" | "doing" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(anyhow!("Unknown status {other}")),
        }
    }
}

/// Estimated duration of a task in whole minutes. `None` is the "no timer" sentinel: the task
/// counts up without a deadline and never raises an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Estimate(Option<NonZeroU32>);

impl Default for Estimate {
    fn default() -> Self {
        Self::minutes(DEFAULT_ESTIMATE_MINUTES).unwrap_or(Self::UNLIMITED)
    }
}

impl Estimate {
    pub const UNLIMITED: Estimate = Estimate(None);

    /// Returns `None` for zero, which is not a valid estimate.
    pub fn minutes(minutes: u32) -> Option<Self> {
        NonZeroU32::new(minutes).map(|v| Estimate(Some(v)))
    }

    pub fn as_minutes(&self) -> Option<u32> {
        self.0.map(NonZeroU32::get)
    }

    pub fn total_seconds(&self) -> Option<u64> {
        self.as_minutes().map(|m| m as u64 * 60)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.as_minutes().map(|m| Duration::minutes(m as i64))
    }

    pub fn is_unlimited(&self) -> bool {
        self.0.is_none()
    }
}

impl Display for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_minutes() {
            Some(m) => write!(f, "{m}m"),
            None => write!(f, "no timer"),
        }
    }
}

impl FromStr for Estimate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('m');
        if matches!(s, "none" | "unlimited" | "-") {
            return Ok(Estimate::UNLIMITED);
        }
        let minutes = s.parse::<u32>()?;
        Estimate::minutes(minutes).ok_or_else(|| anyhow!("Estimate must be a positive number of minutes"))
    }
}

/// Visual threshold of a running timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerLevel {
    Normal,
    Warning,
    Danger,
}

/// A card on the kanban board. While the task is [TaskStatus::InProgress] the stored timestamps
/// are the source of truth; `elapsed_seconds` is only a cache refreshed from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanTask {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "time")]
    pub estimated_minutes: Estimate,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "elapsed")]
    pub elapsed_seconds: u64,
    #[serde(default)]
    pub alarm_triggered: bool,
    #[serde(default)]
    pub scheduled_for_deletion: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub deletion_time: Option<DateTime<Utc>>,
}

impl KanbanTask {
    pub fn new(id: TaskId, title: impl Into<String>, estimated_minutes: Estimate) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            estimated_minutes,
            status: TaskStatus::Pending,
            priority: Priority::default(),
            tags: vec![],
            start_time: None,
            end_time: None,
            elapsed_seconds: 0,
            alarm_triggered: false,
            scheduled_for_deletion: false,
            deletion_time: None,
        }
    }

    /// Refreshes the elapsed cache from `start_time`. Missed ticks therefore never cause drift.
    pub fn recompute_elapsed(&mut self, now: DateTime<Utc>) -> u64 {
        if let Some(start) = self.start_time {
            self.elapsed_seconds = whole_seconds_between(start, now);
        }
        self.elapsed_seconds
    }

    /// Seconds left until the deadline according to the cached elapsed value. Negative when
    /// overdue, `None` for tasks without a timer.
    pub fn remaining_seconds(&self) -> Option<i64> {
        self.estimated_minutes
            .total_seconds()
            .map(|total| total as i64 - self.elapsed_seconds as i64)
    }

    pub fn progress(&self) -> Option<Percentage> {
        self.estimated_minutes
            .total_seconds()
            .map(|total| seconds_percentage(self.elapsed_seconds, total))
    }

    pub fn timer_level(&self) -> TimerLevel {
        match self.progress() {
            Some(p) if *p >= DANGER_PERCENT => TimerLevel::Danger,
            Some(p) if *p >= WARNING_PERCENT => TimerLevel::Warning,
            _ => TimerLevel::Normal,
        }
    }

    /// A task whose deadline still has to be watched by the tick loop and the recovery scan.
    pub fn has_armed_timer(&self) -> bool {
        self.status == TaskStatus::InProgress && self.end_time.is_some() && !self.alarm_triggered
    }

    /// Enters [TaskStatus::InProgress] with a fresh deadline derived from `now`.
    pub(crate) fn enter_progress(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.start_time = Some(now);
        self.end_time = self.estimated_minutes.duration().map(|d| now + d);
        self.elapsed_seconds = 0;
        self.alarm_triggered = false;
        self.scheduled_for_deletion = false;
        self.deletion_time = None;
    }

    /// Clears the timestamps that only exist while a task is in progress. A pending task carries
    /// no timer state at all.
    pub(crate) fn leave_progress(&mut self, status: TaskStatus) {
        self.status = status;
        self.start_time = None;
        self.end_time = None;
        if status == TaskStatus::Pending {
            self.elapsed_seconds = 0;
            self.alarm_triggered = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration};

    use super::{Estimate, KanbanTask, TaskStatus, TimerLevel};

    fn at(ms: i64) -> chrono::DateTime<chrono::Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn elapsed_is_derived_from_start_time() {
        let mut task = KanbanTask::new(1, "Write report", Estimate::minutes(30).unwrap());
        task.enter_progress(at(0));

        assert_eq!(task.recompute_elapsed(at(1_999)), 1);
        assert_eq!(task.recompute_elapsed(at(1_800_000 - 1)), 1799);
        assert_eq!(task.remaining_seconds(), Some(1));
        assert_eq!(task.recompute_elapsed(at(1_800_000)), 1800);
        assert_eq!(task.remaining_seconds(), Some(0));
    }

    #[test]
    fn elapsed_never_negative() {
        let mut task = KanbanTask::new(1, "clock went back", Estimate::default());
        task.enter_progress(at(10_000));
        assert_eq!(task.recompute_elapsed(at(0)), 0);
    }

    #[test]
    fn entering_progress_stamps_deadline() {
        let mut task = KanbanTask::new(7, "t", Estimate::minutes(10).unwrap());
        task.alarm_triggered = true;
        task.enter_progress(at(5_000));

        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.start_time, Some(at(5_000)));
        assert_eq!(task.end_time, Some(at(5_000) + Duration::minutes(10)));
        assert!(!task.alarm_triggered);
        assert!(task.has_armed_timer());
    }

    #[test]
    fn unlimited_task_has_no_deadline() {
        let mut task = KanbanTask::new(2, "open ended", Estimate::UNLIMITED);
        task.enter_progress(at(0));
        assert_eq!(task.end_time, None);
        assert!(!task.has_armed_timer());
        task.recompute_elapsed(at(10_000_000));
        assert_eq!(task.remaining_seconds(), None);
        assert_eq!(task.timer_level(), TimerLevel::Normal);
    }

    #[test]
    fn levels_follow_progress() {
        let mut task = KanbanTask::new(3, "t", Estimate::minutes(10).unwrap());
        task.elapsed_seconds = 479;
        assert_eq!(task.timer_level(), TimerLevel::Normal);
        task.elapsed_seconds = 480;
        assert_eq!(task.timer_level(), TimerLevel::Warning);
        task.elapsed_seconds = 600;
        assert_eq!(task.timer_level(), TimerLevel::Danger);
    }

    #[test]
    fn leaving_to_pending_resets_elapsed() {
        let mut task = KanbanTask::new(4, "t", Estimate::default());
        task.enter_progress(at(0));
        task.recompute_elapsed(at(90_000));
        task.leave_progress(TaskStatus::Done);
        assert_eq!(task.elapsed_seconds, 90);
        assert_eq!(task.start_time, None);
        task.leave_progress(TaskStatus::Pending);
        assert_eq!(task.elapsed_seconds, 0);
    }

    #[test]
    fn estimate_parsing() {
        assert_eq!("45".parse::<Estimate>().unwrap(), Estimate::minutes(45).unwrap());
        assert_eq!("45m".parse::<Estimate>().unwrap(), Estimate::minutes(45).unwrap());
        assert_eq!("none".parse::<Estimate>().unwrap(), Estimate::UNLIMITED);
        assert!("0".parse::<Estimate>().is_err());
    }

    #[test]
    fn loads_legacy_fields() -> anyhow::Result<()> {
        let task: KanbanTask = serde_json::from_str(
            r#"{"id":2,"title":"Implementar login","status":"progress","time":60,"elapsed":1200,"priority":"alta"}"#,
        )?;
        assert_eq!(task.estimated_minutes, Estimate::minutes(60).unwrap());
        assert_eq!(task.elapsed_seconds, 1200);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.start_time, None);
        Ok(())
    }

    #[test]
    fn timestamps_are_epoch_millis() -> anyhow::Result<()> {
        let mut task = KanbanTask::new(9, "t", Estimate::minutes(1).unwrap());
        task.enter_progress(at(1_000));
        let json = serde_json::to_value(&task)?;
        assert_eq!(json["startTime"], 1_000);
        assert_eq!(json["endTime"], 61_000);
        assert_eq!(json["estimatedMinutes"], 1);
        assert_eq!(json["deletionTime"], serde_json::Value::Null);
        Ok(())
    }
}
