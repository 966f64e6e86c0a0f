use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{
    collections::Priority,
    kanban::{KanbanTask, TaskId},
};

pub const HISTORY_CAPACITY: usize = 1000;

/// Snapshot of a kanban task taken when its timer completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub completed_at: DateTime<Utc>,
    /// Seconds.
    pub time_spent: u64,
    /// Minutes, `None` when the task had no timer.
    pub estimated_time: Option<u32>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "kanban_source")]
    pub source: String,
}

fn kanban_source() -> String {
    "kanban".into()
}

impl HistoryEntry {
    pub fn snapshot(task: &KanbanTask, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            completed_at,
            time_spent: task.elapsed_seconds,
            estimated_time: task.estimated_minutes.as_minutes(),
            priority: task.priority,
            tags: task.tags.clone(),
            source: kanban_source(),
        }
    }
}

/// Completion log, newest entry first, holding at most [HISTORY_CAPACITY] entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CompletionHistory(VecDeque<HistoryEntry>);

impl<'de> Deserialize<'de> for CompletionHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut entries = VecDeque::<HistoryEntry>::deserialize(deserializer)?;
        entries.truncate(HISTORY_CAPACITY);
        Ok(Self(entries))
    }
}

impl CompletionHistory {
    /// Adds `entry` as the newest one and evicts the oldest entries past the capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.0.push_front(entry);
        self.0.truncate(HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.0.front()
    }

    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.0.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.0.iter()
    }
}
