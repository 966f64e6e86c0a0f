use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::{
    alarm::AlarmRequest,
    model::kanban::{Estimate, TaskId, TaskStatus},
    utils::percentage::Percentage,
};

/// Everything the controller reacts to. Timers, the console and the background channel only ever
/// produce these; the controller alone changes state.
#[derive(Debug)]
pub enum EngineEvent {
    Tick,
    Recover(RecoverTrigger),
    DeletionTick(TaskId),
    SnoozeElapsed(AlarmRequest),
    Command(UserCommand),
    Background(BackgroundMessage),
}

/// Why a recovery scan runs. Each one may follow an arbitrarily long pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverTrigger {
    Startup,
    Focus,
    Visible,
    /// Two ticks were much further apart than the tick interval, the machine was asleep.
    Resumed,
    /// `check-alarms` from the background channel.
    Background,
}

/// Messages of the background channel. Each one is safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum BackgroundMessage {
    StopAlarm,
    Snooze {
        #[serde(default)]
        minutes: Option<u32>,
    },
    CheckAlarms,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum UserCommand {
    #[command(about = "Add a kanban task")]
    Add {
        #[arg(short, long, help = "Estimate, like 25 or 25m. 'none' for no timer")]
        minutes: Option<Estimate>,
        #[arg(short, long, help = "Put the task in progress right away")]
        start: bool,
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },
    #[command(about = "Start the timer of a pending task")]
    Start { id: TaskId },
    #[command(about = "Move a task to the next column")]
    Advance { id: TaskId },
    #[command(about = "Move a task to any column")]
    Move { id: TaskId, status: TaskStatus },
    #[command(about = "Change the title or the estimate of a task")]
    Edit {
        id: TaskId,
        #[arg(short, long)]
        minutes: Option<Estimate>,
        #[arg(trailing_var_arg = true)]
        title: Vec<String>,
    },
    #[command(about = "Delete a task")]
    Delete { id: TaskId },
    #[command(about = "Keep a completed task and restart its timer")]
    Cancel { id: TaskId },
    #[command(about = "Silence the current alarm")]
    Stop,
    #[command(about = "Silence the current alarm and repeat it later")]
    Snooze { minutes: Option<u32> },
    #[command(about = "Check timers, as after the window regained focus")]
    Focus,
    #[command(about = "Check timers, as after the window became visible again")]
    Visible,
    #[command(about = "Show the board")]
    List,
    #[command(about = "Show recently completed tasks")]
    History {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Write a backup of everything")]
    Export { path: PathBuf },
    #[command(about = "Restore a backup")]
    Import { path: PathBuf },
    #[command(about = "Alarm volume, like 80%")]
    Volume { volume: Percentage },
    #[command(about = "Enable or disable desktop notifications")]
    Notifications {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    #[command(about = "Stop the engine", alias = "exit")]
    Quit,
}

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: UserCommand,
}

/// Parses one line of console input. JSON objects are background messages, anything else is a
/// command. Blank lines give `None`.
pub fn parse_line(line: &str) -> Result<Option<EngineEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        let message = serde_json::from_str::<BackgroundMessage>(line)
            .map_err(|e| anyhow!("Invalid background message: {e}"))?;
        return Ok(Some(EngineEvent::Background(message)));
    }

    let line = ConsoleLine::try_parse_from(line.split_whitespace())?;
    Ok(Some(EngineEvent::Command(line.command)))
}

#[cfg(test)]
mod tests {
    use crate::model::kanban::{Estimate, TaskStatus};

    use super::{parse_line, BackgroundMessage, EngineEvent, UserCommand};

    fn command(line: &str) -> UserCommand {
        match parse_line(line) {
            Ok(Some(EngineEvent::Command(command))) => command,
            other => panic!("{line} parsed into {other:?}"),
        }
    }

    #[test]
    fn add_keeps_the_whole_title() {
        assert_eq!(
            command("add -m 1 --start Write the report"),
            UserCommand::Add {
                minutes: Estimate::minutes(1),
                start: true,
                title: vec!["Write".into(), "the".into(), "report".into()],
            }
        );
        assert_eq!(
            command("add -m none Read"),
            UserCommand::Add {
                minutes: Some(Estimate::UNLIMITED),
                start: false,
                title: vec!["Read".into()],
            }
        );
    }

    #[test]
    fn status_and_volume_arguments() {
        assert_eq!(
            command("move 3 done"),
            UserCommand::Move {
                id: 3,
                status: TaskStatus::Done
            }
        );
        match command("volume 80%") {
            UserCommand::Volume { volume } => assert_eq!(*volume, 80.),
            other => panic!("{other:?}"),
        }
        assert_eq!(
            command("notifications false"),
            UserCommand::Notifications { enabled: false }
        );
        assert_eq!(command("exit"), UserCommand::Quit);
    }

    #[test]
    fn background_messages() -> anyhow::Result<()> {
        let cases = [
            (r#"{"action":"stop-alarm"}"#, BackgroundMessage::StopAlarm),
            (
                r#"{"action":"snooze","minutes":10}"#,
                BackgroundMessage::Snooze { minutes: Some(10) },
            ),
            (r#"{"action":"snooze"}"#, BackgroundMessage::Snooze { minutes: None }),
            (r#"{"action":"check-alarms"}"#, BackgroundMessage::CheckAlarms),
        ];
        for (raw, expected) in cases {
            match parse_line(raw)? {
                Some(EngineEvent::Background(message)) => assert_eq!(message, expected),
                other => panic!("{raw} parsed into {other:?}"),
            }
        }
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_line("   "), Ok(None)));
        assert!(parse_line("launch 1").is_err());
        assert!(parse_line("start abc").is_err());
        assert!(parse_line("add").is_err());
        assert!(parse_line(r#"{"action":"explode"}"#).is_err());
    }
}
