//! Kanban board whose in-progress tasks carry a wall-clock deadline. Timers survive suspension and
//! restarts, raise a multi-channel alarm exactly once, and completed tasks leave the board after
//! an undo window.

pub mod alarm;
pub mod board;
pub mod cli;
pub mod engine;
pub mod model;
pub mod storage;
pub mod ui;
pub mod utils;
