use chrono::{DateTime, Duration, Utc};

/// `mm:ss` used for running timers. Minutes are not wrapped into hours.
pub fn format_timer(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `m:ss` used for the auto-delete countdown. Partial seconds round up so the display reaches
/// `0:00` only when the deadline has actually passed.
pub fn format_countdown(remaining: Duration) -> String {
    let millis = remaining.num_milliseconds().max(0);
    let seconds = (millis + 999) / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Whole seconds from `start` to `now`, never negative.
pub fn whole_seconds_between(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    ((now - start).num_milliseconds().max(0) / 1000) as u64
}
