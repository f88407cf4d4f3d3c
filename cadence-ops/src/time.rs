use chrono::{DateTime, Duration, Timelike, Utc};

/// Truncate to the start of the minute. Always a floor, never a rounding.
///
/// A leap second (`nanosecond() >= 1_000_000_000`) stays in its own minute.
pub fn floor_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(ts)
}

/// Contiguous run of whole minutes, both ends inclusive.
#[derive(Debug, Clone)]
pub struct MinuteRange {
    next: Option<DateTime<Utc>>,
    last: DateTime<Utc>,
}

impl MinuteRange {
    /// Both bounds are floored first, so `first` and `last` may carry seconds.
    pub fn new(first: DateTime<Utc>, last: DateTime<Utc>) -> Self {
        let first = floor_minute(first);
        let last = floor_minute(last);
        Self {
            next: (first <= last).then_some(first),
            last,
        }
    }
}

impl Iterator for MinuteRange {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current
            .checked_add_signed(Duration::minutes(1))
            .filter(|n| *n <= self.last);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self
            .next
            .map(|n| ((self.last - n).num_minutes() + 1) as usize)
            .unwrap_or(0);
        (n, Some(n))
    }
}

impl ExactSizeIterator for MinuteRange {}
