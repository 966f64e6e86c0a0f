use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    alarm::{
        channels::{AlarmChannels, Presenter, WakeLock},
        wake_lock::WakeLockGuard,
        AlarmDispatcher, AlarmRequest, TriggerOutcome,
    },
    board::{auto_delete::DeletionTick, Board, NewKanbanTask},
    model::kanban::{TaskId, TaskStatus},
    storage::{
        kv::KeyValueStore,
        snapshot::Snapshot,
        state::{load_board, save_board, save_parts, save_settings},
    },
    ui::{format_board, format_history},
    utils::clock::Clock,
};

use super::{
    countdown::Countdowns,
    event::{BackgroundMessage, EngineEvent, RecoverTrigger, UserCommand},
    ticker::spawn_delayed,
    EngineConfig,
};

/// What has to be written after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Nothing,
    Board,
    Settings,
}

/// Sole owner of the [Board]. Handles one event at a time; after each one it lines up the
/// countdown tickers and the wake-lock with the board, persists and renders.
pub struct Controller<S> {
    board: Board,
    store: S,
    alarm: AlarmDispatcher,
    wake_lock: WakeLockGuard,
    countdowns: Countdowns,
    /// Pending snooze delays, called off when the user acts on the task in the meantime.
    snoozed: HashMap<TaskId, CancellationToken>,
    presenter: Arc<dyn Presenter>,
    clock: Arc<dyn Clock>,
    next: mpsc::Sender<EngineEvent>,
    receiver: mpsc::Receiver<EngineEvent>,
    shutdown: CancellationToken,
    config: EngineConfig,
}

impl<S: KeyValueStore> Controller<S> {
    pub async fn load(
        store: S,
        channels: AlarmChannels,
        wake_lock: Arc<dyn WakeLock>,
        clock: Arc<dyn Clock>,
        (next, receiver): (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>),
        shutdown: CancellationToken,
        config: EngineConfig,
    ) -> Self {
        let board = load_board(&store).await;
        let presenter = channels.presenter.clone();
        let mut alarm = AlarmDispatcher::new(channels, clock.clone(), shutdown.clone());
        alarm.apply_settings(&board.settings);
        let countdowns = Countdowns::new(
            next.clone(),
            clock.clone(),
            shutdown.clone(),
            config.countdown_interval,
        );

        Self {
            board,
            store,
            alarm,
            wake_lock: WakeLockGuard::new(wake_lock),
            countdowns,
            snoozed: HashMap::new(),
            presenter,
            clock,
            next,
            receiver,
            shutdown,
            config,
        }
    }

    /// Executes the controller event loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        self.handle(EngineEvent::Recover(RecoverTrigger::Startup))
            .await;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = self.receiver.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            self.handle(event).await;
        }
        self.finish().await
    }

    async fn handle(&mut self, event: EngineEvent) {
        let now = self.clock.time();
        debug!("Handling {event:?}");

        let persist = match event {
            EngineEvent::Tick => {
                let report = self.board.tick(now);
                // Idle ticks change nothing worth writing.
                let persist = if report.is_empty() {
                    Persist::Nothing
                } else {
                    Persist::Board
                };
                self.completed(report.fired);
                persist
            }
            EngineEvent::Recover(trigger) => self.recover(trigger, now),
            EngineEvent::DeletionTick(id) => match self.board.deletion_tick(id, now) {
                // The render below refreshes the countdown.
                DeletionTick::Remaining(_) => Persist::Nothing,
                DeletionTick::Deleted(task) => {
                    self.presenter
                        .notice(&format!("Task \"{}\" removed from the board", task.title));
                    Persist::Board
                }
                DeletionTick::Inactive => {
                    self.countdowns.cancel(id);
                    Persist::Nothing
                }
            },
            EngineEvent::SnoozeElapsed(request) => {
                if self.snoozed.remove(&request.task_id).is_some() {
                    info!("Snooze of task {} elapsed", request.task_id);
                    self.dispatch(vec![request]);
                } else {
                    debug!("Snooze of task {} was called off", request.task_id);
                }
                Persist::Nothing
            }
            EngineEvent::Background(message) => match message {
                BackgroundMessage::StopAlarm => {
                    self.alarm.stop();
                    Persist::Nothing
                }
                BackgroundMessage::Snooze { minutes } => {
                    self.snooze(minutes);
                    Persist::Nothing
                }
                BackgroundMessage::CheckAlarms => self.recover(RecoverTrigger::Background, now),
            },
            EngineEvent::Command(command) => match self.run_command(command).await {
                Ok(persist) => persist,
                Err(e) => {
                    warn!("Command failed {e:?}");
                    self.presenter.notice(&e.to_string());
                    Persist::Nothing
                }
            },
        };

        self.countdowns
            .reconcile(self.board.scheduled_for_deletion());
        self.wake_lock
            .sync(self.board.has_running_timer() || self.alarm.is_playing());

        let saved = match persist {
            Persist::Nothing => Ok(()),
            Persist::Board => save_board(&self.store, &mut self.board).await,
            Persist::Settings => save_settings(&self.store, &self.board.settings).await,
        };
        if let Err(e) = saved {
            error!("Failed to persist state {e:?}");
        }

        self.presenter.render(&self.board, now);
    }

    fn recover(&mut self, trigger: RecoverTrigger, now: DateTime<Utc>) -> Persist {
        if matches!(trigger, RecoverTrigger::Visible | RecoverTrigger::Resumed) {
            self.wake_lock.invalidate();
        }
        let report = self.board.recover_all(now);
        debug!(
            "Recovery after {trigger:?} refreshed {} timers and fired {}",
            report.refreshed,
            report.fired.len()
        );
        let persist = if report.is_empty() {
            Persist::Nothing
        } else {
            Persist::Board
        };
        self.completed(report.fired);
        persist
    }

    /// Alarms for freshly completed timers, preceded by the completion chime.
    fn completed(&mut self, fired: Vec<AlarmRequest>) {
        if !fired.is_empty() {
            self.alarm.chime();
        }
        self.dispatch(fired);
    }

    fn dispatch(&mut self, fired: Vec<AlarmRequest>) {
        for request in fired {
            let task_id = request.task_id;
            match self.alarm.trigger(request) {
                TriggerOutcome::Started => (),
                TriggerOutcome::Queued => self.presenter.notice(&format!(
                    "Task {task_id} finished too, its alarm plays after the current one"
                )),
                TriggerOutcome::AlreadyQueued => debug!("Alarm of task {task_id} already pending"),
            }
        }
    }

    fn snooze(&mut self, minutes: Option<u32>) {
        let Some(request) = self.alarm.snooze() else {
            debug!("Nothing to snooze");
            return;
        };
        let delay = minutes
            .map(|m| Duration::from_secs(m as u64 * 60))
            .unwrap_or(self.config.snooze);
        self.presenter
            .notice(&format!("Alarm snoozed for {} minutes", delay.as_secs() / 60));
        let token = self.shutdown.child_token();
        if let Some(previous) = self.snoozed.insert(request.task_id, token.clone()) {
            previous.cancel();
        }
        spawn_delayed(
            self.next.clone(),
            self.clock.clone(),
            token,
            delay,
            EngineEvent::SnoozeElapsed(request),
        );
    }

    /// The task was started, moved or removed by hand, so its snoozed alarm is stale.
    fn call_off_snooze(&mut self, id: TaskId) {
        if let Some(token) = self.snoozed.remove(&id) {
            token.cancel();
            info!("Called off the snoozed alarm of task {id}");
        }
    }

    async fn run_command(&mut self, command: UserCommand) -> Result<Persist> {
        let now = self.clock.time();
        let persist = match command {
            UserCommand::Add {
                minutes,
                start,
                title,
            } => {
                let status = if start {
                    TaskStatus::InProgress
                } else {
                    TaskStatus::Pending
                };
                let new = NewKanbanTask::new(title.join(" "), minutes.unwrap_or_default())
                    .with_status(status);
                let id = self.board.create_task(new, now);
                self.presenter.notice(&format!("Added task {id}"));
                Persist::Board
            }
            UserCommand::Start { id } => {
                self.board.start_timer(id, now)?;
                self.call_off_snooze(id);
                Persist::Board
            }
            UserCommand::Advance { id } => {
                let status = self.board.advance(id, now)?;
                self.call_off_snooze(id);
                self.presenter.notice(&format!("Task {id} is now {status}"));
                Persist::Board
            }
            UserCommand::Move { id, status } => {
                self.board.move_task(id, status, now)?;
                self.call_off_snooze(id);
                Persist::Board
            }
            UserCommand::Edit { id, minutes, title } => {
                let title = (!title.is_empty()).then(|| title.join(" "));
                self.board.edit_task(id, title, minutes)?;
                Persist::Board
            }
            UserCommand::Delete { id } => {
                let task = self.board.delete_task(id)?;
                self.call_off_snooze(id);
                self.presenter
                    .notice(&format!("Deleted task \"{}\"", task.title));
                Persist::Board
            }
            UserCommand::Cancel { id } => {
                let kept = self.board.cancel_auto_delete(id, now)?;
                self.call_off_snooze(id);
                if kept {
                    self.presenter
                        .notice(&format!("Task {id} kept, its timer started again"));
                } else {
                    self.presenter
                        .notice(&format!("Task {id} is not waiting for deletion"));
                }
                Persist::Board
            }
            UserCommand::Stop => {
                self.alarm.stop();
                Persist::Nothing
            }
            UserCommand::Snooze { minutes } => {
                self.snooze(minutes);
                Persist::Nothing
            }
            UserCommand::Focus => self.recover(RecoverTrigger::Focus, now),
            UserCommand::Visible => self.recover(RecoverTrigger::Visible, now),
            UserCommand::List => {
                self.presenter.notice(&format_board(&self.board, now));
                Persist::Nothing
            }
            UserCommand::History { limit } => {
                self.presenter
                    .notice(&format_history(self.board.history(), limit));
                Persist::Nothing
            }
            UserCommand::Export { path } => {
                let snapshot = Snapshot::capture(&self.board, now);
                tokio::fs::write(&path, serde_json::to_string_pretty(&snapshot)?).await?;
                self.presenter.notice(&format!("Exported to {}", path.display()));
                Persist::Nothing
            }
            UserCommand::Import { path } => {
                let snapshot = Snapshot::from_json(&tokio::fs::read_to_string(&path).await?)?;
                let mut parts = self.board.clone().into_parts();
                snapshot.apply(&mut parts);
                let saved = save_parts(&self.store, &parts).await;

                // Same as a fresh start: everything comes from the store again.
                self.alarm.shutdown();
                for (_, token) in self.snoozed.drain() {
                    token.cancel();
                }
                self.board = load_board(&self.store).await;
                self.alarm.apply_settings(&self.board.settings);
                saved?;
                self.presenter.notice("Backup imported");
                self.recover(RecoverTrigger::Startup, now)
            }
            UserCommand::Volume { volume } => {
                self.board.set_volume(volume.as_unit());
                self.alarm.apply_settings(&self.board.settings);
                self.presenter.notice(&format!(
                    "Volume set to {:.0}%",
                    self.board.settings.audio_volume * 100.
                ));
                Persist::Settings
            }
            UserCommand::Notifications { enabled } => {
                self.board.settings.notifications_enabled = enabled;
                self.alarm.apply_settings(&self.board.settings);
                Persist::Settings
            }
            UserCommand::Quit => {
                info!("Quit requested");
                self.shutdown.cancel();
                Persist::Nothing
            }
        };
        Ok(persist)
    }

    /// Stops every timer and alarm and writes the final state.
    async fn finish(mut self) -> Result<()> {
        self.alarm.shutdown();
        self.countdowns.cancel_all();
        self.wake_lock.release();
        save_board(&self.store, &mut self.board)
            .await
            .inspect_err(|e| error!("Failed to persist state on shutdown {e:?}"))
    }
}
