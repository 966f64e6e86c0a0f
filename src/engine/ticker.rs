use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::clock::Clock;

use super::event::{EngineEvent, RecoverTrigger};

/// Emits [EngineEvent::Tick] every `interval`. When the wall clock moved much further than the
/// interval between two ticks the process was suspended, and a recovery is requested instead.
pub struct TickLoop {
    next: mpsc::Sender<EngineEvent>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    interval: Duration,
}

impl TickLoop {
    pub fn new(
        next: mpsc::Sender<EngineEvent>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            next,
            clock,
            shutdown,
            interval,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.clock.instant();
        let mut last_tick = self.clock.time();
        loop {
            tick_point += self.interval;

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }

            let now = self.clock.time();
            let gap = (now - last_tick).to_std().unwrap_or_default();
            last_tick = now;

            let event = if gap > self.interval * 2 {
                info!("{gap:?} passed since the previous tick, recovering timers");
                EngineEvent::Recover(RecoverTrigger::Resumed)
            } else {
                EngineEvent::Tick
            };
            if self.next.send(event).await.is_err() {
                debug!("Controller is gone, stopping the tick loop");
                return Ok(());
            }

            // Ticks missed while suspended are not replayed.
            let current = self.clock.instant();
            if current > tick_point + self.interval {
                tick_point = current;
            }
        }
    }
}

/// Sends `event` after `delay` unless `token` is cancelled first.
pub fn spawn_delayed(
    next: mpsc::Sender<EngineEvent>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
    delay: Duration,
    event: EngineEvent,
) {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => (),
            _ = clock.sleep(delay) => {
                let _ = next.send(event).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::DateTime;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        engine::event::{EngineEvent, RecoverTrigger},
        utils::clock::OffsetClock,
    };

    use super::{spawn_delayed, TickLoop};

    fn clock() -> Arc<OffsetClock> {
        Arc::new(OffsetClock::new(DateTime::from_timestamp_millis(0).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_interval() {
        let (sender, mut receiver) = mpsc::channel(100);
        let shutdown = CancellationToken::new();
        let ticker = TickLoop::new(sender, clock(), shutdown.clone(), Duration::from_secs(1));

        let (result, ticks) = tokio::join!(ticker.run(), async {
            tokio::time::sleep(Duration::from_millis(5500)).await;
            shutdown.cancel();
            let mut ticks = 0;
            while let Some(event) = receiver.recv().await {
                assert!(matches!(event, EngineEvent::Tick));
                ticks += 1;
            }
            ticks
        });
        result.unwrap();
        assert_eq!(ticks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn long_gap_requests_recovery() {
        let (sender, mut receiver) = mpsc::channel(100);
        let shutdown = CancellationToken::new();
        let ticker = TickLoop::new(sender, clock(), shutdown.clone(), Duration::from_secs(1));

        let (result, events) = tokio::join!(ticker.run(), async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            tokio::time::advance(Duration::from_secs(3600)).await;
            tokio::time::sleep(Duration::from_millis(1800)).await;
            shutdown.cancel();
            let mut events = vec![];
            while let Some(event) = receiver.recv().await {
                events.push(event);
            }
            events
        });
        result.unwrap();

        assert!(matches!(events[0], EngineEvent::Tick));
        assert!(matches!(
            events[1],
            EngineEvent::Recover(RecoverTrigger::Resumed)
        ));
        // Missed ticks are not replayed.
        assert!(events.len() <= 4, "{events:?}");
        assert!(events[2..].iter().all(|v| matches!(v, EngineEvent::Tick)));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_event_can_be_cancelled() {
        let (sender, mut receiver) = mpsc::channel(10);
        let token = CancellationToken::new();
        spawn_delayed(
            sender.clone(),
            clock(),
            token.clone(),
            Duration::from_secs(60),
            EngineEvent::Tick,
        );
        spawn_delayed(
            sender,
            clock(),
            CancellationToken::new(),
            Duration::from_secs(300),
            EngineEvent::Recover(RecoverTrigger::Focus),
        );
        token.cancel();

        let event = receiver.recv().await;
        assert!(matches!(
            event,
            Some(EngineEvent::Recover(RecoverTrigger::Focus))
        ));
        assert!(receiver.recv().await.is_none());
    }
}
