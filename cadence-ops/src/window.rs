use chrono::{DateTime, Duration, Utc};

/// Trailing window over time-sorted `(key, duration)` entries.
///
/// After `advance_to(m)` the window holds exactly the entries whose key lies
/// in `(m - size, m]`. Both pointers only move forward.
///
/// The sum is never decremented. A step that evicts re-adds the survivors
/// left to right, so `sum` is always bit-identical to summing
/// `entries[tail..head]` in order.
#[derive(Debug)]
pub struct TrailingWindow<'a> {
    entries: &'a [(DateTime<Utc>, f64)],
    size: Duration,
    // entries[tail..head] are inside the window
    head: usize,
    tail: usize,
    sum: f64,
}

impl<'a> TrailingWindow<'a> {
    /// `entries` must be sorted by key.
    pub fn new(entries: &'a [(DateTime<Utc>, f64)], size: Duration) -> Self {
        Self {
            entries,
            size,
            head: 0,
            tail: 0,
            sum: 0.0,
        }
    }

    /// Move the right edge to `minute`. Calls must use non-decreasing minutes.
    pub fn advance_to(&mut self, minute: DateTime<Utc>) {
        // admit: right edge is inclusive
        while let Some((ts, d)) = self.entries.get(self.head) {
            if *ts > minute {
                break;
            }
            self.sum += d;
            self.head += 1;
        }

        // evict: left edge is exclusive, so an entry exactly `size` old is out
        let before = self.tail;
        if let Some(cutoff) = minute.checked_sub_signed(self.size) {
            while self.tail < self.head && self.entries[self.tail].0 <= cutoff {
                self.tail += 1;
            }
        }
        if self.tail != before {
            self.sum = self.entries[self.tail..self.head]
                .iter()
                .fold(0.0_f64, |acc, (_, d)| acc + d);
        }
    }

    pub fn len(&self) -> usize {
        self.head - self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Mean duration inside the window, `0.0` when empty.
    pub fn average(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.sum / self.len() as f64
        }
    }
}
