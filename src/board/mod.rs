//! The application state and every operation that mutates it. [Board] is a plain value: all
//! operations take the current time as a parameter and never perform I/O, so the engine decides
//! when to persist, render and dispatch alarms.

pub mod auto_delete;
pub mod timer;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::model::{
    collections::{Habit, Priority, ScheduleItem, Task},
    history::CompletionHistory,
    kanban::{Estimate, KanbanTask, TaskId, TaskStatus},
    settings::Settings,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("Task {0} does not exist")]
    TaskNotFound(TaskId),
    #[error("Task {id} can't go from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Input for [Board::create_task].
#[derive(Debug, Clone)]
pub struct NewKanbanTask {
    pub title: String,
    pub description: String,
    pub estimate: Estimate,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub status: TaskStatus,
}

impl NewKanbanTask {
    pub fn new(title: impl Into<String>, estimate: Estimate) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            estimate,
            priority: Priority::default(),
            tags: vec![],
            status: TaskStatus::Pending,
        }
    }

    pub fn with_status(self, status: TaskStatus) -> Self {
        Self { status, ..self }
    }
}

/// Everything a [Board] is built from. Used by the loader and by imports.
#[derive(Debug, Clone, Default)]
pub struct BoardParts {
    pub kanban: Vec<KanbanTask>,
    pub history: CompletionHistory,
    pub tasks: Vec<Task>,
    pub habits: Vec<Habit>,
    pub schedule: Vec<ScheduleItem>,
    pub settings: Settings,
}

#[derive(Debug, Clone, Default)]
pub struct Board {
    kanban: Vec<KanbanTask>,
    history: CompletionHistory,
    history_dirty: bool,
    pub tasks: Vec<Task>,
    pub habits: Vec<Habit>,
    pub schedule: Vec<ScheduleItem>,
    pub settings: Settings,
}

impl Board {
    pub fn from_parts(
        BoardParts {
            kanban,
            history,
            tasks,
            habits,
            schedule,
            settings,
        }: BoardParts,
    ) -> Self {
        Self {
            kanban,
            history,
            history_dirty: false,
            tasks,
            habits,
            schedule,
            settings,
        }
    }

    pub fn into_parts(self) -> BoardParts {
        BoardParts {
            kanban: self.kanban,
            history: self.history,
            tasks: self.tasks,
            habits: self.habits,
            schedule: self.schedule,
            settings: self.settings,
        }
    }

    pub fn kanban(&self) -> &[KanbanTask] {
        &self.kanban
    }

    pub fn task(&self, id: TaskId) -> Option<&KanbanTask> {
        self.kanban.iter().find(|t| t.id == id)
    }

    pub fn history(&self) -> &CompletionHistory {
        &self.history
    }

    /// Reports whether the history changed since the last call, so it's only written when needed.
    pub fn take_history_dirty(&mut self) -> bool {
        std::mem::take(&mut self.history_dirty)
    }

    pub fn mark_history_dirty(&mut self) {
        self.history_dirty = true;
    }

    pub fn has_running_timer(&self) -> bool {
        self.kanban
            .iter()
            .any(|t| t.status == TaskStatus::InProgress && t.start_time.is_some())
    }

    fn position(&self, id: TaskId) -> Result<usize, BoardError> {
        self.kanban
            .iter()
            .position(|t| t.id == id)
            .ok_or(BoardError::TaskNotFound(id))
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut KanbanTask, BoardError> {
        let idx = self.position(id)?;
        Ok(&mut self.kanban[idx])
    }

    /// Ids only grow: a new task always gets an id above every existing one.
    fn next_id(&self) -> TaskId {
        self.kanban.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn create_task(&mut self, new: NewKanbanTask, now: DateTime<Utc>) -> TaskId {
        let id = self.next_id();
        let mut task = KanbanTask::new(id, new.title, new.estimate);
        task.description = new.description;
        task.priority = new.priority;
        task.tags = new.tags;
        match new.status {
            TaskStatus::InProgress => task.enter_progress(now),
            status => task.status = status,
        }
        debug!("Created kanban task {id} as {}", task.status);
        self.kanban.push(task);
        id
    }

    /// Changes title and/or estimate. A running task keeps its start time and gets its deadline
    /// re-derived from the new estimate.
    pub fn edit_task(
        &mut self,
        id: TaskId,
        title: Option<String>,
        estimate: Option<Estimate>,
    ) -> Result<(), BoardError> {
        let task = self.task_mut(id)?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(estimate) = estimate {
            task.estimated_minutes = estimate;
            if task.status == TaskStatus::InProgress {
                task.end_time = task
                    .start_time
                    .zip(estimate.duration())
                    .map(|(start, d)| start + d);
            }
        }
        Ok(())
    }

    /// Starts the timer of a pending task.
    pub fn start_timer(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<(), BoardError> {
        let task = self.task_mut(id)?;
        if task.status != TaskStatus::Pending {
            return Err(BoardError::InvalidTransition {
                id,
                from: task.status,
                to: TaskStatus::InProgress,
            });
        }
        task.enter_progress(now);
        Ok(())
    }

    /// Moves a task to the next column, wrapping from done back to pending.
    pub fn advance(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<TaskStatus, BoardError> {
        let next = self.task_mut(id)?.status.next();
        self.move_task(id, next, now)?;
        Ok(next)
    }

    /// Manual column change. Never schedules an auto-delete, and drops one that was pending.
    pub fn move_task(
        &mut self,
        id: TaskId,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), BoardError> {
        let task = self.task_mut(id)?;
        let previous = task.status;
        if previous == status {
            return Ok(());
        }

        task.scheduled_for_deletion = false;
        task.deletion_time = None;

        if status == TaskStatus::InProgress {
            task.enter_progress(now);
        } else {
            if previous == TaskStatus::InProgress {
                task.recompute_elapsed(now);
            }
            task.leave_progress(status);
        }
        debug!("Moved kanban task {id} from {previous} to {status}");
        Ok(())
    }

    pub fn delete_task(&mut self, id: TaskId) -> Result<KanbanTask, BoardError> {
        let idx = self.position(id)?;
        Ok(self.kanban.remove(idx))
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.settings.set_volume(volume);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, Utc};

    use crate::model::kanban::{Estimate, TaskStatus};

    use super::{Board, BoardError, NewKanbanTask};

    pub(crate) fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    pub(crate) fn board_with(minutes: u32) -> (Board, u64) {
        let mut board = Board::default();
        let id = board.create_task(
            NewKanbanTask::new("Write report", Estimate::minutes(minutes).unwrap()),
            at(0),
        );
        (board, id)
    }

    #[test]
    fn ids_are_monotonic() {
        let mut board = Board::default();
        let a = board.create_task(NewKanbanTask::new("a", Estimate::default()), at(0));
        let b = board.create_task(NewKanbanTask::new("b", Estimate::default()), at(0));
        board.delete_task(a).unwrap();
        let c = board.create_task(NewKanbanTask::new("c", Estimate::default()), at(0));
        assert!(a < b && b < c);
    }

    #[test]
    fn created_pending_has_no_timestamps() {
        let (board, id) = board_with(30);
        let task = board.task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.start_time, None);
        assert_eq!(task.end_time, None);
    }

    #[test]
    fn created_in_progress_is_stamped() {
        let mut board = Board::default();
        let id = board.create_task(
            NewKanbanTask::new("now", Estimate::minutes(5).unwrap())
                .with_status(TaskStatus::InProgress),
            at(1_000),
        );
        let task = board.task(id).unwrap();
        assert_eq!(task.end_time, Some(at(301_000)));
        assert!(board.has_running_timer());
    }

    #[test]
    fn start_timer_only_from_pending() {
        let (mut board, id) = board_with(30);
        board.start_timer(id, at(0)).unwrap();
        assert_eq!(
            board.start_timer(id, at(10)),
            Err(BoardError::InvalidTransition {
                id,
                from: TaskStatus::InProgress,
                to: TaskStatus::InProgress
            })
        );
        assert_eq!(board.start_timer(99, at(0)), Err(BoardError::TaskNotFound(99)));
    }

    #[test]
    fn advance_cycles_and_clears_timestamps() {
        let (mut board, id) = board_with(30);
        assert_eq!(board.advance(id, at(0)).unwrap(), TaskStatus::InProgress);
        assert_eq!(board.advance(id, at(65_000)).unwrap(), TaskStatus::Done);

        let task = board.task(id).unwrap();
        assert_eq!(task.start_time, None);
        assert_eq!(task.end_time, None);
        assert_eq!(task.elapsed_seconds, 65);
        assert!(!task.scheduled_for_deletion);
        assert!(!board.has_running_timer());

        assert_eq!(board.advance(id, at(70_000)).unwrap(), TaskStatus::Pending);
        assert_eq!(board.task(id).unwrap().elapsed_seconds, 0);
    }

    #[test]
    fn moving_into_progress_again_restarts_clock() {
        let (mut board, id) = board_with(30);
        board.move_task(id, TaskStatus::InProgress, at(0)).unwrap();
        board.move_task(id, TaskStatus::Done, at(10_000)).unwrap();
        board.move_task(id, TaskStatus::InProgress, at(50_000)).unwrap();
        let task = board.task(id).unwrap();
        assert_eq!(task.start_time, Some(at(50_000)));
        assert_eq!(task.elapsed_seconds, 0);
    }

    #[test]
    fn editing_running_task_rederives_deadline() {
        let (mut board, id) = board_with(30);
        board.start_timer(id, at(0)).unwrap();
        board
            .edit_task(id, Some("Write summary".into()), Estimate::minutes(45))
            .unwrap();
        let task = board.task(id).unwrap();
        assert_eq!(task.title, "Write summary");
        assert_eq!(task.end_time, Some(at(45 * 60_000)));
    }
}
