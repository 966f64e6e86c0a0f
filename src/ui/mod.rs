//! Text rendering of the board, shared by the engine console and the one-shot CLI commands.

pub mod console;

use std::fmt::Write;

use ansi_term::{Colour, Style};
use chrono::{DateTime, Local, Utc};

use crate::{
    board::Board,
    model::{
        history::CompletionHistory,
        kanban::{KanbanTask, TaskStatus, TimerLevel},
    },
    utils::time::{format_countdown, format_timer, whole_seconds_between},
};

const COLUMNS: [TaskStatus; 3] = [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Done];

/// Timer column of a card. Running timers are measured against `now`, not the elapsed cache.
pub fn timer_text(task: &KanbanTask, now: DateTime<Utc>) -> String {
    if let (true, Some(deletion_time)) = (task.scheduled_for_deletion, task.deletion_time) {
        return format!("deleting in {}", format_countdown(deletion_time - now));
    }
    match (task.status, task.start_time) {
        (TaskStatus::InProgress, Some(start)) => {
            let elapsed = whole_seconds_between(start, now);
            match task.estimated_minutes.total_seconds() {
                Some(total) => format!("{} / {}", format_timer(elapsed), format_timer(total)),
                None => format_timer(elapsed),
            }
        }
        (TaskStatus::Done, _) => format_timer(task.elapsed_seconds),
        _ => task.estimated_minutes.to_string(),
    }
}

fn level_style(level: TimerLevel) -> Style {
    match level {
        TimerLevel::Normal => Style::new(),
        TimerLevel::Warning => Colour::Yellow.normal(),
        TimerLevel::Danger => Colour::Red.bold(),
    }
}

pub fn format_board(board: &Board, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for column in COLUMNS {
        let tasks: Vec<_> = board.kanban().iter().filter(|t| t.status == column).collect();
        let _ = writeln!(out, "{} ({})", Style::new().bold().paint(column.to_string()), tasks.len());
        for task in tasks {
            let level = match task.status {
                TaskStatus::InProgress => task.timer_level(),
                _ => TimerLevel::Normal,
            };
            let _ = writeln!(
                out,
                "  {}\t{}\t{}",
                task.id,
                level_style(level).paint(timer_text(task, now)),
                task.title
            );
        }
    }
    out
}

pub fn format_history(history: &CompletionHistory, limit: usize) -> String {
    let mut out = String::new();
    for entry in history.iter().take(limit) {
        let estimate = entry
            .estimated_time
            .map(|v| format!("{v}m"))
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}",
            entry.completed_at.with_timezone(&Local).format("%x %H:%M"),
            format_timer(entry.time_spent),
            estimate,
            entry.title
        );
    }
    if out.is_empty() {
        out.push_str("No completed tasks yet\n");
    }
    out
}
