// Schedule cursor and catch-up window
//
// The cursor is the Unix timestamp of the last minute fully scheduled. Each
// pass covers the minutes after it up to the current minute, unless that span
// exceeds the catch-up bound or runs backwards, in which case the pass only
// covers the current minute.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use std::fmt;

/// Longest catch-up bound accepted, one leap year
pub const MAX_CATCHUP_SECONDS: u64 = 366 * 24 * 60 * 60;

/// Truncate seconds and sub-seconds
pub fn minute_floor(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

/// Decode a stored cursor value; absent or unreadable values count as epoch
pub fn cursor_instant(stored: Option<&str>) -> DateTime<Utc> {
    stored
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_default()
}

/// Inclusive span of minute-aligned instants evaluated in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleWindow {
    /// Window for a pass at `now` given the stored cursor
    pub fn compute(cursor: DateTime<Utc>, now: DateTime<Utc>, max_catchup: Duration) -> Self {
        let end = minute_floor(now);
        let start = match minute_floor(cursor).checked_add_signed(Duration::minutes(1)) {
            Some(start) if start <= end && end - start <= max_catchup => start,
            // Beyond the bound, in the future, or past the last representable minute
            _ => end,
        };

        Self { start, end }
    }

    /// More than the current minute is covered
    pub fn is_catch_up(&self) -> bool {
        self.start != self.end
    }

    /// Number of minutes in the window
    pub fn minute_count(&self) -> i64 {
        (self.end - self.start).num_minutes() + 1
    }

    /// Every minute from `start` to `end`, inclusive
    pub fn minutes(&self) -> impl Iterator<Item = DateTime<Utc>> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |t| {
            t.checked_add_signed(Duration::minutes(1))
                .filter(|next| *next <= end)
        })
        .take_while(move |t| *t <= end)
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}
