use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::event::{parse_line, EngineEvent};

/// Reads commands from stdin until shutdown. A closed stdin only stops the reading; the engine
/// keeps running its timers.
pub async fn read_console(next: mpsc::Sender<EngineEvent>, shutdown: CancellationToken) -> Result<()> {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next() => line,
        };
        let line = match line {
            Some(line) => line?,
            None => {
                info!("Console input closed");
                return Ok(());
            }
        };

        match parse_line(&line) {
            Ok(Some(event)) => {
                debug!("Console event {event:?}");
                if next.send(event).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => (),
            Err(e) => match e.downcast_ref::<clap::Error>() {
                Some(e) => println!("{}", e.render().ansi()),
                None => println!("{e}"),
            },
        }
    }
}
