use std::{
    io::Write,
    sync::{Mutex, MutexGuard},
};

use ansi_term::Colour;
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{alarm::channels::Presenter, board::Board};

use super::{format_board, timer_text};

/// Prints to stdout. The board is printed again only when its layout changed (a card moved, a
/// timer crossed a threshold), since the running timers change every second. Deletion countdowns
/// are kept on one status line that is rewritten in place.
#[derive(Default)]
pub struct ConsolePresenter {
    state: Mutex<ConsoleState>,
}

#[derive(Default)]
struct ConsoleState {
    layout: Option<String>,
    status: Option<String>,
}

impl ConsoleState {
    /// Wipes the status line so the next output starts on a clean line.
    fn clear_status(&mut self) {
        if self.status.take().is_some() {
            print!("\r\x1b[2K");
        }
    }
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Everything visible on the board except the running clock values.
fn layout(board: &Board) -> String {
    board
        .kanban()
        .iter()
        .map(|t| {
            format!(
                "{}:{}:{:?}:{}:{}",
                t.id,
                t.status,
                t.timer_level(),
                t.scheduled_for_deletion,
                t.title
            )
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Remaining time of every task waiting for deletion, `None` when there are none.
fn countdown_line(board: &Board, now: DateTime<Utc>) -> Option<String> {
    let line = board
        .kanban()
        .iter()
        .filter(|t| t.scheduled_for_deletion)
        .map(|t| format!("{} {}", t.title, timer_text(t, now)))
        .collect::<Vec<_>>()
        .join(" | ");
    (!line.is_empty()).then_some(line)
}

impl Presenter for ConsolePresenter {
    fn render(&self, board: &Board, now: DateTime<Utc>) {
        let mut state = self.state();
        let layout = layout(board);
        if state.layout.as_deref() != Some(layout.as_str()) {
            state.clear_status();
            println!("{}", format_board(board, now));
            state.layout = Some(layout);
        }

        match countdown_line(board, now) {
            Some(line) if state.status.as_ref() != Some(&line) => {
                print!("\r\x1b[2K{line}");
                let _ = std::io::stdout().flush();
                state.status = Some(line);
            }
            Some(_) => {}
            None => state.clear_status(),
        }
    }

    fn show_alarm(&self, message: &str) -> Result<()> {
        self.state().clear_status();
        println!(
            "{}",
            Colour::Red
                .bold()
                .paint(format!("⏰ {message}. Type 'stop' or 'snooze'"))
        );
        Ok(())
    }

    fn hide_alarm(&self) -> Result<()> {
        self.state().clear_status();
        println!("{}", Colour::Green.paint("Alarm stopped"));
        Ok(())
    }

    fn notice(&self, message: &str) {
        self.state().clear_status();
        println!("{message}");
    }
}
