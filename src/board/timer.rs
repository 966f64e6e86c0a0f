use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::{alarm::AlarmRequest, model::kanban::TaskStatus};

use super::Board;

/// What a tick or recovery scan did. The caller dispatches `fired` in order.
#[derive(Debug, Default, PartialEq)]
pub struct TimerReport {
    pub fired: Vec<AlarmRequest>,
    pub refreshed: usize,
}

impl TimerReport {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && self.refreshed == 0
    }
}

impl Board {
    /// Re-synchronizes every running timer with `now`, however much time passed since the last
    /// call. Deadlines that were crossed while nothing was running complete here, each exactly
    /// once, because completion sets `alarm_triggered` and the scan skips such tasks.
    pub fn recover_all(&mut self, now: DateTime<Utc>) -> TimerReport {
        let mut report = TimerReport::default();
        for idx in 0..self.kanban.len() {
            let task = &mut self.kanban[idx];
            if task.status != TaskStatus::InProgress {
                continue;
            }
            if task.start_time.is_none() {
                // Stored by an older version that only kept the elapsed counter.
                let start = i64::try_from(task.elapsed_seconds)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|elapsed| now.checked_sub_signed(elapsed));
                let start = match start {
                    Some(start) => start,
                    None => {
                        warn!(
                            "Task {} has an unusable elapsed time {}, restarting it now",
                            task.id, task.elapsed_seconds
                        );
                        task.elapsed_seconds = 0;
                        now
                    }
                };
                warn!("Task {} was running without timestamps, restoring them", task.id);
                task.start_time = Some(start);
                task.end_time = task.estimated_minutes.duration().map(|d| start + d);
            }
            if task.alarm_triggered {
                continue;
            }

            match task.end_time {
                Some(end) if now >= end => {
                    info!("Task {} passed its deadline while inactive", task.id);
                    report.fired.push(self.complete_timer(idx, now));
                }
                _ => {
                    task.recompute_elapsed(now);
                    report.refreshed += 1;
                }
            }
        }
        report
    }

    /// One step of the foreground loop: refreshes the elapsed cache of every running timer and
    /// completes the ones with no time remaining.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TimerReport {
        let mut report = TimerReport::default();
        for idx in 0..self.kanban.len() {
            let task = &mut self.kanban[idx];
            if task.status != TaskStatus::InProgress
                || task.start_time.is_none()
                || task.alarm_triggered
            {
                continue;
            }
            task.recompute_elapsed(now);
            report.refreshed += 1;

            if matches!(task.remaining_seconds(), Some(remaining) if remaining <= 0) {
                report.fired.push(self.complete_timer(idx, now));
            }
        }
        report
    }

    /// Deadline reached: marks the alarm as fired, clamps the elapsed time to the estimate,
    /// finishes the task and starts its auto-delete window.
    fn complete_timer(&mut self, idx: usize, now: DateTime<Utc>) -> AlarmRequest {
        let task = &mut self.kanban[idx];
        task.alarm_triggered = true;
        if let Some(total) = task.estimated_minutes.total_seconds() {
            task.elapsed_seconds = total;
        }
        task.leave_progress(TaskStatus::Done);
        let request = AlarmRequest::new(task.id, task.title.clone(), now);
        debug!("Timer of task {} completed", task.id);

        self.schedule_auto_delete_at(idx, now);
        request
    }
}
