use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    engine::start_engine,
    model::settings::CustomAudio,
    storage::{
        kv::FileStore,
        snapshot::Snapshot,
        state::{load_board, load_parts, load_settings, save_parts, save_settings},
    },
    ui::{format_board, format_history},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, ENGINE_PREFIX},
        percentage::Percentage,
    },
};

#[derive(Parser, Debug)]
#[command(name = "zentasks", version, long_about = None)]
#[command(about = "Kanban board with task timers and alarms", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable trace logging")]
    log: bool,
    #[arg(long = "log-console", help = "Also print logs to the console")]
    log_console: bool,
    #[arg(long = "log-filter", help = "Log level, overrides RUST_LOG")]
    log_filter: Option<LevelFilter>,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run the board in this console. Timers, alarms and auto-delete only run while it is up"
    )]
    Serve,
    #[command(about = "Print the board")]
    List,
    #[command(about = "Print recently completed tasks")]
    History {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Write a backup of all data")]
    Export {
        #[arg(help = "Defaults to zen-tasks-backup_<date>.json")]
        path: Option<PathBuf>,
    },
    #[command(about = "Restore a backup. Only the parts present in it are replaced")]
    Import { path: PathBuf },
    #[command(about = "Show or set the alarm volume, like 80%")]
    Volume { volume: Option<Percentage> },
    #[command(about = "Custom alarm sound")]
    Audio {
        #[command(subcommand)]
        command: AudioCommand,
    },
    #[command(about = "Enable or disable desktop notifications")]
    Notifications {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AudioCommand {
    #[command(about = "Use an mp3, wav or ogg file of at most 500KB")]
    Set { path: PathBuf },
    #[command(about = "Go back to the built-in tone")]
    Clear,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        args.log_filter
    };
    let prefix = match args.commands {
        Commands::Serve => ENGINE_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir.join("logs"), logging_level, args.log_console)?;

    let store = FileStore::new(app_dir.join("store"))?;
    let now = DefaultClock.time();
    match args.commands {
        Commands::Serve => start_engine(app_dir).await?,
        Commands::List => {
            print!("{}", format_board(&load_board(&store).await, now));
        }
        Commands::History { limit } => {
            print!("{}", format_history(load_board(&store).await.history(), limit));
        }
        Commands::Export { path } => {
            let path = path.unwrap_or_else(|| {
                PathBuf::from(format!("zen-tasks-backup_{}.json", now.format("%Y-%m-%d")))
            });
            let snapshot = Snapshot::capture(&load_board(&store).await, now);
            tokio::fs::write(&path, serde_json::to_string_pretty(&snapshot)?).await?;
            println!("Exported to {}", path.display());
        }
        Commands::Import { path } => {
            let snapshot = Snapshot::from_json(&tokio::fs::read_to_string(&path).await?)?;
            let mut parts = load_parts(&store).await;
            let replaced = snapshot.apply(&mut parts);
            save_parts(&store, &parts).await?;
            info!("Imported {path:?}");
            println!("Imported {replaced} parts. A running engine picks them up after 'import' or a restart");
        }
        Commands::Volume { volume } => {
            let mut settings = load_settings(&store).await;
            if let Some(volume) = volume {
                settings.set_volume(volume.as_unit());
                save_settings(&store, &settings).await?;
            }
            println!("Volume {:.0}%", settings.audio_volume * 100.);
        }
        Commands::Audio { command } => {
            let mut settings = load_settings(&store).await;
            settings.custom_audio = match command {
                AudioCommand::Set { path } => Some(CustomAudio::from_file(&path)?),
                AudioCommand::Clear => None,
            };
            save_settings(&store, &settings).await?;
            match &settings.custom_audio {
                Some(audio) => println!("Alarm sound set ({})", audio.mime()),
                None => println!("Alarm sound reset to the built-in tone"),
            }
        }
        Commands::Notifications { enabled } => {
            let mut settings = load_settings(&store).await;
            settings.notifications_enabled = enabled;
            save_settings(&store, &settings).await?;
        }
    }
    Ok(())
}
