//! Maps [Board] onto the store keys.

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{debug, error};

use crate::{
    board::{Board, BoardParts},
    model::settings::{CustomAudio, Settings},
};

use super::{
    keys,
    kv::{read_or_default, KeyValueStore},
};

pub async fn load_parts(store: &impl KeyValueStore) -> BoardParts {
    BoardParts {
        kanban: read_or_default(store, keys::KANBAN).await,
        history: read_or_default(store, keys::HISTORY).await,
        tasks: read_or_default(store, keys::TASKS).await,
        habits: read_or_default(store, keys::HABITS).await,
        schedule: read_or_default(store, keys::SCHEDULE).await,
        settings: load_settings(store).await,
    }
}

pub async fn load_board(store: &impl KeyValueStore) -> Board {
    let board = Board::from_parts(load_parts(store).await);
    debug!(
        "Loaded {} kanban tasks and {} history entries",
        board.kanban().len(),
        board.history().len()
    );
    board
}

/// A missing scalar keeps its default, which isn't always the type's default.
pub async fn load_settings(store: &impl KeyValueStore) -> Settings {
    let defaults = Settings::default();
    let audio_volume = read_or_default::<Option<f32>>(store, keys::AUDIO_VOLUME)
        .await
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0., 1.))
        .unwrap_or(defaults.audio_volume);

    Settings {
        audio_volume,
        custom_audio: read_or_default::<Option<CustomAudio>>(store, keys::CUSTOM_AUDIO).await,
        dark_mode: read_or_default::<Option<bool>>(store, keys::DARK_MODE)
            .await
            .unwrap_or(defaults.dark_mode),
        notifications_enabled: read_or_default::<Option<bool>>(store, keys::NOTIFICATIONS)
            .await
            .unwrap_or(defaults.notifications_enabled),
        animations_enabled: read_or_default::<Option<bool>>(store, keys::ANIMATIONS)
            .await
            .unwrap_or(defaults.animations_enabled),
        current_view: read_or_default::<Option<String>>(store, keys::CURRENT_VIEW)
            .await
            .unwrap_or(defaults.current_view),
    }
}

/// Writes the collections that change during normal operation. The history is only written when
/// it changed since the last save.
pub async fn save_board(store: &impl KeyValueStore, board: &mut Board) -> Result<()> {
    let mut values = vec![
        json(keys::KANBAN, board.kanban()),
        json(keys::TASKS, &board.tasks),
        json(keys::HABITS, &board.habits),
        json(keys::SCHEDULE, &board.schedule),
    ];
    let history_changed = board.take_history_dirty();
    if history_changed {
        values.push(json(keys::HISTORY, board.history()));
    }
    let result = write_all(store, values).await;
    if history_changed && result.is_err() {
        // Tried again on the next save.
        board.mark_history_dirty();
    }
    result
}

pub async fn save_settings(store: &impl KeyValueStore, settings: &Settings) -> Result<()> {
    if settings.custom_audio.is_none() {
        if let Err(e) = store.remove(keys::CUSTOM_AUDIO).await {
            error!("Failed to remove {} {e:?}", keys::CUSTOM_AUDIO);
        }
    }
    let mut values = vec![
        json(keys::AUDIO_VOLUME, &settings.audio_volume),
        json(keys::DARK_MODE, &settings.dark_mode),
        json(keys::NOTIFICATIONS, &settings.notifications_enabled),
        json(keys::ANIMATIONS, &settings.animations_enabled),
        json(keys::CURRENT_VIEW, &settings.current_view),
    ];
    if let Some(audio) = &settings.custom_audio {
        values.push(json(keys::CUSTOM_AUDIO, audio));
    }
    write_all(store, values).await
}

/// Writes every key, history included. Used after an import.
pub async fn save_parts(store: &impl KeyValueStore, parts: &BoardParts) -> Result<()> {
    let board_result = write_all(
        store,
        vec![
            json(keys::KANBAN, &parts.kanban),
            json(keys::HISTORY, &parts.history),
            json(keys::TASKS, &parts.tasks),
            json(keys::HABITS, &parts.habits),
            json(keys::SCHEDULE, &parts.schedule),
        ],
    )
    .await;
    let settings_result = save_settings(store, &parts.settings).await;
    board_result.and(settings_result)
}

fn json<'a, T: Serialize + ?Sized>(
    key: &'a str,
    value: &T,
) -> (&'a str, serde_json::Result<String>) {
    (key, serde_json::to_string(value))
}

/// Keeps writing after a failed key, so one bad key doesn't hold back the others.
async fn write_all(
    store: &impl KeyValueStore,
    values: Vec<(&str, serde_json::Result<String>)>,
) -> Result<()> {
    let mut failed = vec![];
    for (key, value) in values {
        let result = match value {
            Ok(value) => store.set(key, value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("Failed to persist {key} {e:?}");
            failed.push(key);
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Failed to persist {}", failed.join(", ")))
    }
}
