//! Persistence is organized as a key/value store ([kv::FileStore]):
//!  - Every logical collection lives under one key as a JSON document.
//!  - Writes are best effort. A crash between two keys can leave them out of sync, which the
//!    loader tolerates because every key is parsed on its own.
//!  - A key whose content can't be parsed is reset to its default value.

pub mod kv;
pub mod snapshot;
pub mod state;

pub mod keys {
    pub const TASKS: &str = "tasks";
    pub const KANBAN: &str = "kanbanTasks";
    pub const HABITS: &str = "habits";
    pub const SCHEDULE: &str = "zenSchedule";
    pub const HISTORY: &str = "zenCompletedHistory";
    pub const AUDIO_VOLUME: &str = "audioVolume";
    pub const CUSTOM_AUDIO: &str = "customAlarmAudio";
    pub const DARK_MODE: &str = "darkMode";
    pub const NOTIFICATIONS: &str = "notificationsEnabled";
    pub const ANIMATIONS: &str = "animationsEnabled";
    pub const CURRENT_VIEW: &str = "currentView";
}
