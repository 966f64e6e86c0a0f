use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::model::{
    history::HistoryEntry,
    kanban::{KanbanTask, TaskId, TaskStatus},
};

use super::{Board, BoardError};

/// How long a completed task stays on the board before it is removed.
pub const AUTO_DELETE_WINDOW_MS: i64 = 120_000;

pub fn auto_delete_window() -> Duration {
    Duration::milliseconds(AUTO_DELETE_WINDOW_MS)
}

/// Result of one step of a task's deletion countdown.
#[derive(Debug, PartialEq)]
pub enum DeletionTick {
    /// Still inside the undo window.
    Remaining(Duration),
    /// The window elapsed and the task was removed from the board.
    Deleted(KanbanTask),
    /// The task is gone or no longer scheduled, so the countdown should stop.
    Inactive,
}

impl Board {
    /// Archives a task whose timer completed and opens its undo window. Calling it again for a
    /// task that is already scheduled returns the existing deletion time without archiving twice.
    pub fn schedule_auto_delete(
        &mut self,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, BoardError> {
        let idx = self.position(id)?;
        let task = &self.kanban[idx];
        if let (true, Some(deletion_time)) = (task.scheduled_for_deletion, task.deletion_time) {
            return Ok(deletion_time);
        }
        if task.status != TaskStatus::Done || !task.alarm_triggered {
            return Err(BoardError::InvalidTransition {
                id,
                from: task.status,
                to: TaskStatus::Done,
            });
        }
        Ok(self.schedule_auto_delete_at(idx, now))
    }

    /// The history entry is written before the flag is set, so a scheduled task always has one.
    pub(super) fn schedule_auto_delete_at(&mut self, idx: usize, now: DateTime<Utc>) -> DateTime<Utc> {
        self.history
            .push(HistoryEntry::snapshot(&self.kanban[idx], now));
        self.history_dirty = true;

        let task = &mut self.kanban[idx];
        let deletion_time = now + auto_delete_window();
        task.scheduled_for_deletion = true;
        task.deletion_time = Some(deletion_time);
        info!("Task {} archived, removing it at {deletion_time}", task.id);
        deletion_time
    }

    pub fn deletion_tick(&mut self, id: TaskId, now: DateTime<Utc>) -> DeletionTick {
        let Ok(idx) = self.position(id) else {
            return DeletionTick::Inactive;
        };
        let task = &self.kanban[idx];
        let deletion_time = match (task.scheduled_for_deletion, task.deletion_time) {
            (true, Some(deletion_time)) => deletion_time,
            _ => return DeletionTick::Inactive,
        };
        if now >= deletion_time {
            debug!("Undo window of task {id} elapsed");
            DeletionTick::Deleted(self.kanban.remove(idx))
        } else {
            DeletionTick::Remaining(deletion_time - now)
        }
    }

    /// Undoes a completion inside its window. The task goes back to in progress with a fresh
    /// deadline starting at `now`. Returns `false` when there was nothing to cancel.
    pub fn cancel_auto_delete(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<bool, BoardError> {
        let task = self.task_mut(id)?;
        if !task.scheduled_for_deletion {
            return Ok(false);
        }
        task.enter_progress(now);
        info!("Auto-delete of task {id} cancelled");
        Ok(true)
    }

    pub fn scheduled_for_deletion(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.kanban
            .iter()
            .filter(|t| t.scheduled_for_deletion)
            .map(|t| t.id)
    }
}
