use chrono::{DateTime, Duration, Utc};

use crate::db::handlers::TransactionFilter;

/// Inclusive time window over `created_at`. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Narrow the window to the trailing `days` ending at `now`, keeping any tighter caller bound.
    ///
    /// The result is always a subset of `self`, so trailing totals never exceed the full totals.
    pub fn trailing(&self, now: DateTime<Utc>, days: i64) -> Self {
        let since = now - Duration::days(days);
        Self {
            start: Some(self.start.map_or(since, |start| start.max(since))),
            end: self.end,
        }
    }

    pub fn filter(&self) -> TransactionFilter {
        TransactionFilter::new().with_start(self.start).with_end(self.end)
    }
}
