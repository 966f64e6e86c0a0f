//! The long running part of the application. Every timer, the console and the background channel
//! feed [event::EngineEvent]s into one channel that [controller::Controller] drains.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use controller::Controller;
use event::EngineEvent;
use ticker::TickLoop;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    alarm::{
        audio::GenericAudio,
        channels::{AlarmChannels, Unsupported, WakeLock},
    },
    storage::kv::{FileStore, KeyValueStore},
    ui::console::ConsolePresenter,
    utils::clock::{Clock, DefaultClock},
};

pub mod controller;
pub mod countdown;
pub mod event;
pub mod input;
pub mod shutdown;
pub mod ticker;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    /// Period of the auto-delete countdown of each task.
    pub countdown_interval: Duration,
    /// Used when a snooze doesn't say how long.
    pub snooze: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            countdown_interval: Duration::from_secs(1),
            snooze: Duration::from_secs(5 * 60),
        }
    }
}

/// Represents the starting point for the engine
pub async fn start_engine(dir: PathBuf) -> Result<()> {
    let store = FileStore::new(dir.join("store"))?;
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let channels = AlarmChannels::new(
        Arc::new(ConsolePresenter::new()),
        Arc::new(GenericAudio::new()),
    );
    let config = EngineConfig::default();

    let shutdown_token = CancellationToken::new();
    let (sender, receiver) = mpsc::channel::<EngineEvent>(EVENT_BUFFER);

    let controller = create_controller(
        store,
        channels,
        Arc::new(Unsupported("wake lock")),
        clock.clone(),
        &shutdown_token,
        (sender.clone(), receiver),
        config,
    )
    .await;
    let ticker = TickLoop::new(
        sender.clone(),
        clock,
        shutdown_token.clone(),
        config.tick_interval,
    );

    let (_, tick_result, input_result, controller_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        ticker.run(),
        input::read_console(sender, shutdown_token.clone()),
        controller.run(),
    );

    if let Err(e) = tick_result {
        error!("Tick loop got an error {e:?}");
    }

    if let Err(e) = input_result {
        error!("Console input got an error {e:?}");
    }

    if let Err(e) = controller_result {
        error!("Controller got an error {e:?}");
    }

    Ok(())
}

async fn create_controller<S: KeyValueStore>(
    store: S,
    channels: AlarmChannels,
    wake_lock: Arc<dyn WakeLock>,
    clock: Arc<dyn Clock>,
    shutdown_token: &CancellationToken,
    channel: (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>),
    config: EngineConfig,
) -> Controller<S> {
    Controller::load(
        store,
        channels,
        wake_lock,
        clock,
        channel,
        shutdown_token.clone(),
        config,
    )
    .await
}

#[cfg(test)]
mod engine_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        alarm::testing::Recorder,
        engine::{
            create_controller,
            event::{parse_line, EngineEvent},
            ticker::TickLoop,
            EngineConfig,
        },
        model::kanban::TaskStatus,
        storage::{kv::testing::FailingStore, state::load_board},
        utils::{
            clock::{Clock, OffsetClock},
            logging::TEST_LOGGING,
        },
    };

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    struct TestEngine {
        store: Arc<FailingStore>,
        recorder: Arc<Recorder>,
        sender: mpsc::Sender<EngineEvent>,
    }

    impl TestEngine {
        async fn send(&self, line: &str) {
            let event = parse_line(line).unwrap().unwrap();
            self.sender.send(event).await.unwrap();
            // Lets the controller handle it.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Runs the controller and the tick loop with a deterministic clock starting at the epoch
    /// while `scenario` drives them. The scenario has to end with `quit`.
    async fn run_engine<F, Fut>(scenario: F) -> Result<()>
    where
        F: FnOnce(TestEngine) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        *TEST_LOGGING;
        let store = Arc::new(FailingStore::default());
        let recorder = Arc::new(Recorder::default());
        let clock: Arc<dyn Clock> = Arc::new(OffsetClock::new(at(0)));
        let shutdown_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(64);

        let controller = create_controller(
            store.clone(),
            recorder.channels(),
            recorder.clone(),
            clock.clone(),
            &shutdown_token,
            (sender.clone(), receiver),
            EngineConfig::default(),
        )
        .await;
        let ticker = TickLoop::new(
            sender.clone(),
            clock,
            shutdown_token.clone(),
            Duration::from_secs(1),
        );

        let engine = TestEngine {
            store,
            recorder,
            sender,
        };
        let (_, tick_result, controller_result) =
            tokio::join!(scenario(engine), ticker.run(), controller.run());
        tick_result?;
        controller_result?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn timer_completes_then_task_is_removed() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 1 --start Write report").await;
            assert_eq!(engine.recorder.count("wake-acquire"), 1);

            tokio::time::sleep(Duration::from_secs(61)).await;
            let board = load_board(&engine.store).await;
            let task = &board.kanban()[0];
            assert_eq!(task.status, TaskStatus::Done);
            assert!(task.alarm_triggered);
            assert!(task.scheduled_for_deletion);
            assert_eq!(task.deletion_time, Some(at(180_000)));
            assert_eq!(board.history().newest().unwrap().time_spent, 60);
            assert_eq!(engine.recorder.count("overlay:"), 1);
            assert_eq!(engine.recorder.count("chime:"), 1);

            tokio::time::sleep(Duration::from_secs(240)).await;
            let board = load_board(&engine.store).await;
            assert!(board.kanban().is_empty());
            assert_eq!(board.history().len(), 1);
            // Still playing, so the display is still kept awake.
            assert_eq!(engine.recorder.count("wake-release"), 0);

            engine.send("stop").await;
            assert_eq!(engine.recorder.count("overlay-hide"), 1);
            assert_eq!(engine.recorder.count("wake-release"), 1);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn suspension_fires_the_alarm_once() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 10 --start Deep work").await;
            tokio::time::sleep(Duration::from_millis(1500)).await;

            tokio::time::advance(Duration::from_secs(3600)).await;
            tokio::time::sleep(Duration::from_millis(100)).await;

            let board = load_board(&engine.store).await;
            let task = &board.kanban()[0];
            assert_eq!(task.status, TaskStatus::Done);
            assert_eq!(task.elapsed_seconds, 600);
            assert_eq!(board.history().len(), 1);

            engine.send("focus").await;
            engine.send(r#"{"action":"check-alarms"}"#).await;
            assert_eq!(engine.recorder.count("overlay:"), 1);
            assert_eq!(load_board(&engine.store).await.history().len(), 1);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_alarms_wait_for_acknowledgment() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 1 --start First").await;
            engine.send("add -m 1 --start Second").await;
            tokio::time::sleep(Duration::from_secs(61)).await;

            let overlays = |engine: &TestEngine| {
                engine
                    .recorder
                    .events()
                    .into_iter()
                    .filter(|v| v.starts_with("overlay:"))
                    .collect::<Vec<_>>()
            };
            assert_eq!(overlays(&engine), vec!["overlay:Time is up for \"First\""]);

            engine.send(r#"{"action":"stop-alarm"}"#).await;
            assert_eq!(overlays(&engine).len(), 2);
            assert!(overlays(&engine)[1].contains("Second"));

            engine.send(r#"{"action":"snooze","minutes":1}"#).await;
            assert_eq!(engine.recorder.count("overlay-hide"), 2);
            tokio::time::sleep(Duration::from_secs(61)).await;
            assert_eq!(overlays(&engine).len(), 3);
            assert!(overlays(&engine)[2].contains("Second"));
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_the_task() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 1 --start Write report").await;
            tokio::time::sleep(Duration::from_secs(61)).await;
            engine.send("stop").await;
            engine.send("cancel 1").await;

            tokio::time::sleep(Duration::from_secs(40)).await;
            let board = load_board(&engine.store).await;
            let task = &board.kanban()[0];
            assert_eq!(task.status, TaskStatus::InProgress);
            assert!(!task.alarm_triggered);
            assert!(!task.scheduled_for_deletion);
            assert_eq!(board.history().len(), 1);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn export_and_import_through_commands() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("backup.json");
        run_engine(|engine| async move {
            engine.send("add -m 25 Plan the week").await;
            engine.send(&format!("export {}", path.display())).await;
            engine.send("delete 1").await;
            assert!(load_board(&engine.store).await.kanban().is_empty());

            engine.send(&format!("import {}", path.display())).await;
            let board = load_board(&engine.store).await;
            assert_eq!(board.kanban().len(), 1);
            assert_eq!(board.kanban()[0].title, "Plan the week");
            assert_eq!(board.kanban()[0].status, TaskStatus::Pending);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_commands_do_not_stop_the_engine() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("start 42").await;
            engine.send("volume 40%").await;
            assert_eq!(engine.recorder.count("notice:Task 42 does not exist"), 1);
            assert_eq!(load_board(&engine.store).await.settings.audio_volume, 0.4);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn snoozed_alarm_of_a_deleted_task_stays_silent() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 1 --start Write report").await;
            tokio::time::sleep(Duration::from_secs(61)).await;
            assert_eq!(engine.recorder.count("overlay:"), 1);

            engine.send("snooze 1").await;
            engine.send("delete 1").await;
            tokio::time::sleep(Duration::from_secs(61)).await;
            assert!(load_board(&engine.store).await.kanban().is_empty());
            assert_eq!(engine.recorder.count("overlay:"), 1);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn snoozed_alarm_of_a_kept_task_stays_silent() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 2 --start Write report").await;
            tokio::time::sleep(Duration::from_secs(121)).await;
            engine.send("snooze 1").await;
            engine.send("cancel 1").await;

            // Past the snooze, before the restarted timer ends.
            tokio::time::sleep(Duration::from_secs(61)).await;
            let board = load_board(&engine.store).await;
            assert_eq!(board.kanban()[0].status, TaskStatus::InProgress);
            assert_eq!(engine.recorder.count("overlay:"), 1);
            engine.send("quit").await;
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn timers_keep_running_when_writes_fail() -> Result<()> {
        run_engine(|engine| async move {
            engine.send("add -m 1 --start Write report").await;
            engine.store.fail_writes(true);

            tokio::time::sleep(Duration::from_secs(61)).await;
            assert_eq!(engine.recorder.count("overlay:Time is up"), 1);
            assert_eq!(engine.recorder.count("chime:"), 1);
            // Only the board in memory knows about the completion.
            let stored = load_board(&engine.store).await;
            assert_eq!(stored.kanban()[0].status, TaskStatus::InProgress);

            engine.send("list").await;
            assert!(engine
                .recorder
                .events()
                .iter()
                .any(|v| v.starts_with("notice:") && v.contains("deleting in")));

            tokio::time::sleep(Duration::from_secs(130)).await;
            assert_eq!(
                engine
                    .recorder
                    .count("notice:Task \"Write report\" removed from the board"),
                1
            );

            engine.store.fail_writes(false);
            engine.send("add -m 5 Next").await;
            let stored = load_board(&engine.store).await;
            assert_eq!(stored.kanban().len(), 1);
            assert_eq!(stored.kanban()[0].title, "Next");
            assert_eq!(stored.history().len(), 1);
            engine.send("quit").await;
        })
        .await
    }
}
