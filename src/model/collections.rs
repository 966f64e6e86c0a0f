//! Collections owned by other parts of the application. The timer engine only loads, persists,
//! exports and imports them, so unknown fields are preserved through `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "high", alias = "alta")]
    High,
    #[default]
    #[serde(rename = "medium", alias = "media")]
    Medium,
    #[serde(rename = "low", alias = "baja")]
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// A to-do list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub date: Option<String>,
    /// `HH:MM`
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub completed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Active weekdays, Sunday first.
    #[serde(default)]
    pub days: [bool; 7],
    /// `YYYY-MM-DD` of every day the habit was done.
    #[serde(default)]
    pub completed_dates: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A recurring block of the weekly schedule with optional travel time around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub id: u64,
    pub subject: String,
    #[serde(default)]
    pub days: Vec<u8>,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    #[serde(default)]
    pub travel_before: u32,
    #[serde(default)]
    pub travel_after: u32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
