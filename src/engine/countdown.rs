use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{model::kanban::TaskId, utils::clock::Clock};

use super::event::EngineEvent;

/// One ticker per task waiting for auto-delete. Every ticker is its own spawned task with its own
/// token, so stopping one leaves the others running.
pub struct Countdowns {
    tickers: HashMap<TaskId, CancellationToken>,
    next: mpsc::Sender<EngineEvent>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    interval: Duration,
}

impl Countdowns {
    pub fn new(
        next: mpsc::Sender<EngineEvent>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            tickers: HashMap::new(),
            next,
            clock,
            shutdown,
            interval,
        }
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.tickers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Does nothing when the task already has a ticker.
    pub fn start(&mut self, id: TaskId) {
        if self.tickers.contains_key(&id) {
            return;
        }
        let token = self.shutdown.child_token();
        self.tickers.insert(id, token.clone());
        debug!("Starting deletion countdown of task {id}");

        let next = self.next.clone();
        let clock = self.clock.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            let mut tick_point = clock.instant();
            loop {
                tick_point += interval;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = clock.sleep_until(tick_point) => ()
                }
                if next.send(EngineEvent::DeletionTick(id)).await.is_err() {
                    return;
                }
                let current = clock.instant();
                if current > tick_point + interval {
                    tick_point = current;
                }
            }
        });
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.tickers.remove(&id) {
            Some(token) => {
                token.cancel();
                debug!("Stopped deletion countdown of task {id}");
                true
            }
            None => false,
        }
    }

    /// Makes the running tickers match exactly the tasks in `scheduled`.
    pub fn reconcile(&mut self, scheduled: impl IntoIterator<Item = TaskId>) {
        let scheduled: HashSet<TaskId> = scheduled.into_iter().collect();
        let stale: Vec<TaskId> = self
            .tickers
            .keys()
            .filter(|id| !scheduled.contains(id))
            .copied()
            .collect();
        for id in stale {
            self.cancel(id);
        }
        for id in scheduled {
            self.start(id);
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, token) in self.tickers.drain() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::DateTime;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{engine::event::EngineEvent, utils::clock::OffsetClock};

    use super::Countdowns;

    fn countdowns() -> (Countdowns, mpsc::Receiver<EngineEvent>) {
        let (sender, receiver) = mpsc::channel(100);
        let clock = Arc::new(OffsetClock::new(DateTime::from_timestamp_millis(0).unwrap()));
        (
            Countdowns::new(sender, clock, CancellationToken::new(), Duration::from_secs(1)),
            receiver,
        )
    }

    fn drain(receiver: &mut mpsc::Receiver<EngineEvent>) -> Vec<u64> {
        let mut ids = vec![];
        while let Ok(event) = receiver.try_recv() {
            if let EngineEvent::DeletionTick(id) = event {
                ids.push(id);
            }
        }
        ids
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_one_keeps_the_other() {
        let (mut countdowns, mut receiver) = countdowns();
        countdowns.start(1);
        countdowns.start(2);
        countdowns.start(2);
        assert_eq!(countdowns.len(), 2);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let mut ids = drain(&mut receiver);
        ids.sort();
        assert_eq!(ids, vec![1, 1, 2, 2]);

        assert!(countdowns.cancel(1));
        assert!(!countdowns.cancel(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(drain(&mut receiver), vec![2, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_follows_the_board() {
        let (mut countdowns, mut receiver) = countdowns();
        countdowns.reconcile([1, 2]);
        assert!(countdowns.is_running(1) && countdowns.is_running(2));

        countdowns.reconcile([2, 3]);
        assert!(!countdowns.is_running(1));
        assert!(countdowns.is_running(3));

        countdowns.cancel_all();
        assert!(countdowns.is_empty());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut receiver).is_empty());
    }
}
