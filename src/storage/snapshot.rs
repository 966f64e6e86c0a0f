//! Backup blob holding every collection and setting in one JSON document.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::{
    board::{Board, BoardParts},
    model::{
        collections::{Habit, ScheduleItem, Task},
        history::CompletionHistory,
        kanban::KanbanTask,
        settings::CustomAudio,
    },
};

pub const SNAPSHOT_VERSION: &str = "1.0";

/// Every field is optional on import, only the present ones replace the current values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
    #[serde(default)]
    pub kanban_tasks: Option<Vec<KanbanTask>>,
    #[serde(default)]
    pub habits: Option<Vec<Habit>>,
    #[serde(default)]
    pub schedule_items: Option<Vec<ScheduleItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_history: Option<CompletionHistory>,
    #[serde(default)]
    pub audio_volume: Option<f32>,
    /// Kept raw so a broken clip only drops the clip, not the whole import.
    #[serde(default)]
    pub custom_audio_data: Option<String>,
    #[serde(default)]
    pub settings: Option<SnapshotSettings>,
    #[serde(default)]
    pub export_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSettings {
    #[serde(default, deserialize_with = "flag")]
    pub notifications: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub animations: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub dark_mode: Option<bool>,
}

/// Accepts `true`, `"true"` and `null`. Anything else is treated as absent.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(v)) => Some(v),
        Some(Flag::Text(v)) => v.parse().ok(),
        None => None,
    })
}

impl Snapshot {
    pub fn capture(board: &Board, now: DateTime<Utc>) -> Self {
        Self {
            tasks: Some(board.tasks.clone()),
            kanban_tasks: Some(board.kanban().to_vec()),
            habits: Some(board.habits.clone()),
            schedule_items: Some(board.schedule.clone()),
            completed_history: Some(board.history().clone()),
            audio_volume: Some(board.settings.audio_volume),
            custom_audio_data: board
                .settings
                .custom_audio
                .as_ref()
                .map(|v| v.as_data_uri().to_string()),
            settings: Some(SnapshotSettings {
                notifications: Some(board.settings.notifications_enabled),
                animations: Some(board.settings.animations_enabled),
                dark_mode: Some(board.settings.dark_mode),
            }),
            export_date: Some(now),
            version: Some(SNAPSHOT_VERSION.into()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(raw)?;
        if let Some(version) = &snapshot.version {
            let major = version.split('.').next().unwrap_or_default();
            if major != "1" {
                return Err(anyhow!("Unsupported backup version {version}"));
            }
        }
        Ok(snapshot)
    }

    /// Replaces the parts present in the snapshot. Returns how many parts were replaced.
    pub fn apply(self, parts: &mut BoardParts) -> usize {
        let mut replaced = 0;

        if let Some(tasks) = self.tasks {
            parts.tasks = tasks;
            replaced += 1;
        }
        if let Some(kanban) = self.kanban_tasks {
            parts.kanban = kanban;
            replaced += 1;
        }
        if let Some(habits) = self.habits {
            parts.habits = habits;
            replaced += 1;
        }
        if let Some(schedule) = self.schedule_items {
            parts.schedule = schedule;
            replaced += 1;
        }
        if let Some(history) = self.completed_history {
            parts.history = history;
            replaced += 1;
        }
        if let Some(volume) = self.audio_volume.filter(|v| v.is_finite()) {
            parts.settings.set_volume(volume);
            replaced += 1;
        }
        if let Some(raw) = self.custom_audio_data {
            match CustomAudio::try_from(raw) {
                Ok(audio) => {
                    parts.settings.custom_audio = Some(audio);
                    replaced += 1;
                }
                Err(e) => warn!("Ignoring custom audio from the backup: {e}"),
            }
        }
        if let Some(settings) = self.settings {
            if let Some(v) = settings.notifications {
                parts.settings.notifications_enabled = v;
                replaced += 1;
            }
            if let Some(v) = settings.animations {
                parts.settings.animations_enabled = v;
                replaced += 1;
            }
            if let Some(v) = settings.dark_mode {
                parts.settings.dark_mode = v;
                replaced += 1;
            }
        }
        info!("Imported {replaced} parts from backup");
        replaced
    }
}
