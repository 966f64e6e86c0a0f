use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source for every timer in the application. Elapsed and remaining time are always
/// derived from [Clock::time], never from counting ticks, so a clock that jumps forward (machine
/// slept, process was stopped) is handled the same way as one that advanced normally.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

/// Wall clock pinned to `start_time` at `reference` that advances together with tokio time.
/// With a paused runtime this makes wall-clock time fully deterministic, including jumps made
/// with [tokio::time::advance].
#[cfg(test)]
#[derive(Clone)]
pub struct OffsetClock {
    start_time: DateTime<Utc>,
    reference: Instant,
}

#[cfg(test)]
impl OffsetClock {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            reference: Instant::now(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for OffsetClock {
    fn time(&self) -> DateTime<Utc> {
        self.start_time + self.reference.elapsed()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;

    use super::{Clock, OffsetClock};

    #[tokio::test(start_paused = true)]
    async fn offset_clock_follows_paused_time() {
        let start = DateTime::from_timestamp_millis(0).unwrap();
        let clock = OffsetClock::new(start);
        assert_eq!(clock.time(), start);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(clock.time().timestamp_millis(), 3_600_000);
    }
}
