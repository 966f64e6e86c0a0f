//! Entities persisted in the key/value store. Field names follow the store's JSON layout
//! (`camelCase`), and older field names are accepted through serde aliases so existing data keeps
//! loading.

pub mod collections;
pub mod history;
pub mod kanban;
pub mod settings;
