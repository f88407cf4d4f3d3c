//! cadence-ops: the trailing moving-average operator.
//!
//! `MovingAverage` turns a batch of translation events into one row per
//! minute, each holding the mean duration of the events inside the trailing
//! window `(minute - window, minute]`.
//!
//! Example
//! ```no_run
//! use cadence_ops::{MovingAverage, Sampling};
//! let op = MovingAverage::new(10).unwrap().with_sampling(Sampling::Exact);
//! let rows = op.aggregate(&[]).unwrap();
//! assert!(rows.is_empty());
//! ```

use cadence_core::{AverageRow, Error, Operator, Result, TranslationEvent};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

pub use cadence_core::config::Sampling;

pub mod time;
pub mod window;
pub use time::{floor_minute, MinuteRange};
pub use window::TrailingWindow;

/// Trailing average of event durations, sampled once per minute.
#[derive(Debug, Clone, Copy)]
pub struct MovingAverage {
    window_minutes: i64,
    window: Duration,
    sampling: Sampling,
}

impl MovingAverage {
    pub fn new(window_minutes: i64) -> Result<Self> {
        let window = Duration::try_minutes(window_minutes)
            .filter(|_| window_minutes > 0)
            .ok_or_else(|| Error::InvalidWindow {
                value: window_minutes.to_string(),
            })?;
        Ok(Self {
            window_minutes,
            window,
            sampling: Sampling::default(),
        })
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn window_minutes(&self) -> i64 {
        self.window_minutes
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    fn key(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self.sampling {
            Sampling::Bucketed => floor_minute(ts),
            Sampling::Exact => ts,
        }
    }

    /// Compute the per-minute series. Input order does not matter.
    #[instrument(
        name = "moving_average",
        skip_all,
        fields(events = events.len(), window_minutes = self.window_minutes, sampling = ?self.sampling)
    )]
    pub fn aggregate(&self, events: &[TranslationEvent]) -> Result<Vec<AverageRow>> {
        for (index, ev) in events.iter().enumerate() {
            if !ev.duration.is_finite() || ev.duration < 0.0 {
                return Err(Error::InvalidEvent {
                    index,
                    duration: ev.duration,
                });
            }
        }

        let mut entries: Vec<(DateTime<Utc>, f64)> = events
            .iter()
            .map(|ev| (self.key(ev.timestamp), ev.duration))
            .collect();
        // total order: tied keys are summed in the same order for any input permutation
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let (first, last) = match (entries.first(), entries.last()) {
            (Some(f), Some(l)) => (f.0, l.0),
            _ => return Ok(Vec::new()),
        };
        let end = match self.sampling {
            Sampling::Bucketed => last,
            Sampling::Exact => floor_minute(last)
                .checked_add_signed(Duration::minutes(1))
                .unwrap_or(last),
        };

        let minutes = MinuteRange::new(first, end);
        let mut rows = Vec::with_capacity(minutes.len());
        let mut window = TrailingWindow::new(&entries, self.window);
        let mut peak = 0usize;
        for minute in minutes {
            window.advance_to(minute);
            peak = peak.max(window.len());
            rows.push(AverageRow::new(minute, window.average()));
        }

        cadence_core::metrics::WINDOW_PEAK_EVENTS.set(peak as i64);
        debug!(rows = rows.len(), peak, "series computed");
        Ok(rows)
    }
}

impl Operator for MovingAverage {
    fn apply(&self, events: &[TranslationEvent]) -> Result<Vec<AverageRow>> {
        self.aggregate(events)
    }

    fn name(&self) -> &'static str {
        "MovingAverage"
    }
}

/// Bucketed trailing average over `window_minutes`.
pub fn aggregate(events: &[TranslationEvent], window_minutes: i64) -> Result<Vec<AverageRow>> {
    MovingAverage::new(window_minutes)?.aggregate(events)
}

pub mod prelude {
    pub use super::{aggregate, floor_minute, MinuteRange, MovingAverage, Sampling, TrailingWindow};
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 12, 26, h, m, s).unwrap()
    }

    fn ev(ts: DateTime<Utc>, d: f64) -> TranslationEvent {
        TranslationEvent::new(ts, d)
    }

    fn series(rows: &[AverageRow]) -> Vec<(u32, f64)> {
        use chrono::Timelike;
        rows.iter()
            .map(|r| (r.minute.minute(), r.average_duration))
            .collect()
    }

    // Re-scan every event for every minute, summing members in (key, duration) order.
    fn naive(events: &[TranslationEvent], w: i64, sampling: Sampling) -> Vec<AverageRow> {
        let key = |ts: DateTime<Utc>| match sampling {
            Sampling::Bucketed => floor_minute(ts),
            Sampling::Exact => ts,
        };
        let Some(lo) = events.iter().map(|e| e.timestamp).min() else {
            return Vec::new();
        };
        let hi = events.iter().map(|e| e.timestamp).max().unwrap();
        let mut keyed: Vec<(DateTime<Utc>, f64)> =
            events.iter().map(|e| (key(e.timestamp), e.duration)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut m = floor_minute(lo);
        let mut end = floor_minute(hi);
        if sampling == Sampling::Exact {
            end += Duration::minutes(1);
        }
        let mut out = Vec::new();
        while m <= end {
            let inside: Vec<f64> = keyed
                .iter()
                .filter(|(k, _)| *k > m - Duration::minutes(w) && *k <= m)
                .map(|(_, d)| *d)
                .collect();
            let avg = if inside.is_empty() {
                0.0
            } else {
                inside.iter().fold(0.0_f64, |acc, d| acc + d) / inside.len() as f64
            };
            out.push(AverageRow::new(m, avg));
            m += Duration::minutes(1);
        }
        out
    }

    // Deterministic scattered events: centisecond durations, second-level offsets.
    fn scattered(n: usize, seed: u64) -> Vec<TranslationEvent> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as i64
        };
        let base = at(9, 0, 0);
        (0..n)
            .map(|_| {
                let offset = next() % (90 * 60);
                let d = (next() % 12_000) as f64 / 100.0;
                ev(base + Duration::seconds(offset), d)
            })
            .collect()
    }

    #[test]
    fn reference_scenario() {
        let events = vec![
            ev(at(10, 0, 0), 20.0),
            ev(at(10, 2, 0), 30.0),
            ev(at(10, 5, 0), 10.0),
        ];
        let rows = aggregate(&events, 5).unwrap();
        assert_eq!(
            series(&rows),
            vec![(0, 20.0), (1, 20.0), (2, 25.0), (3, 25.0), (4, 25.0), (5, 20.0)]
        );
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(aggregate(&[], 3).unwrap().is_empty());
        let op = MovingAverage::new(3).unwrap().with_sampling(Sampling::Exact);
        assert!(op.aggregate(&[]).unwrap().is_empty());
    }

    #[test]
    fn single_event_is_one_row() {
        for w in [1, 5, 1_000] {
            let rows = aggregate(&[ev(at(18, 11, 8) + Duration::microseconds(509_654), 20.0)], w).unwrap();
            assert_eq!(rows, vec![AverageRow::new(at(18, 11, 0), 20.0)]);
        }
    }

    #[test]
    fn rejects_non_positive_window() {
        for w in [0, -1, i64::MIN] {
            assert!(matches!(
                MovingAverage::new(w),
                Err(Error::InvalidWindow { .. })
            ));
        }
        assert!(matches!(
            aggregate(&[ev(at(10, 0, 0), 1.0)], 0),
            Err(Error::InvalidWindow { .. })
        ));
        // beyond what a chrono Duration can hold
        assert!(MovingAverage::new(i64::MAX).is_err());
    }

    #[test]
    fn rejects_negative_or_nan_duration() {
        let events = vec![ev(at(10, 0, 0), 1.0), ev(at(10, 1, 0), -0.5)];
        match aggregate(&events, 5) {
            Err(Error::InvalidEvent { index, duration }) => {
                assert_eq!(index, 1);
                assert_eq!(duration, -0.5);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            aggregate(&[ev(at(10, 0, 0), f64::NAN)], 5),
            Err(Error::InvalidEvent { index: 0, .. })
        ));
    }

    #[test]
    fn boundary_is_left_open_right_closed() {
        for w in 1..=6i64 {
            let events = vec![ev(at(10, 0, 0), 10.0), ev(at(10, 15, 0), 50.0)];
            let rows = aggregate(&events, w).unwrap();
            assert_eq!(rows.len(), 16);
            for (i, row) in rows.iter().take(15).enumerate() {
                let expected = if (i as i64) < w { 10.0 } else { 0.0 };
                assert_eq!(row.average_duration, expected, "w={w} minute={i}");
            }
            assert_eq!(rows[15].average_duration, 50.0);
        }
    }

    #[test]
    fn empty_minutes_between_events_are_zero() {
        let events = vec![ev(at(10, 0, 30), 4.0), ev(at(10, 4, 0), 8.0)];
        let rows = aggregate(&events, 1).unwrap();
        assert_eq!(
            series(&rows),
            vec![(0, 4.0), (1, 0.0), (2, 0.0), (3, 0.0), (4, 8.0)]
        );
    }

    #[test]
    fn shared_timestamp_and_duplicates() {
        let t = at(12, 30, 15);
        let rows = aggregate(&[ev(t, 1.0), ev(t, 2.0), ev(t, 6.0)], 2).unwrap();
        assert_eq!(rows, vec![AverageRow::new(at(12, 30, 0), 3.0)]);
    }

    #[test]
    fn wide_window_accumulates() {
        let events = vec![
            ev(at(10, 0, 0), 10.0),
            ev(at(10, 1, 0), 20.0),
            ev(at(10, 2, 0), 60.0),
        ];
        let rows = aggregate(&events, 60).unwrap();
        assert_eq!(series(&rows), vec![(0, 10.0), (1, 15.0), (2, 30.0)]);
    }

    #[test]
    fn input_order_does_not_matter() {
        let events = scattered(200, 7);
        let expected = aggregate(&events, 7).unwrap();

        let mut reversed = events.clone();
        reversed.reverse();
        assert_eq!(aggregate(&reversed, 7).unwrap(), expected);

        for k in [1, 13, 199] {
            let mut rotated = events.clone();
            rotated.rotate_left(k);
            assert_eq!(aggregate(&rotated, 7).unwrap(), expected);
        }

        let (evens, odds): (Vec<_>, Vec<_>) = events.iter().cloned().enumerate().partition(|(i, _)| i % 2 == 0);
        let interleaved: Vec<_> = odds.into_iter().chain(evens).map(|(_, e)| e).collect();
        assert_eq!(aggregate(&interleaved, 7).unwrap(), expected);

        // and repeated calls agree
        assert_eq!(aggregate(&events, 7).unwrap(), expected);
    }

    #[test]
    fn fractional_ties_are_order_independent() {
        let t = at(10, 0, 0);
        let forward = vec![ev(t, 0.1), ev(t, 0.2), ev(t, 0.3)];
        let expected = aggregate(&forward, 5).unwrap();
        let orders: [[usize; 3]; 5] = [[2, 1, 0], [1, 0, 2], [0, 2, 1], [2, 0, 1], [1, 2, 0]];
        for order in orders {
            let permuted: Vec<_> = order.iter().map(|&i| forward[i].clone()).collect();
            assert_eq!(aggregate(&permuted, 5).unwrap(), expected, "{order:?}");
        }
        for sampling in [Sampling::Bucketed, Sampling::Exact] {
            let op = MovingAverage::new(5).unwrap().with_sampling(sampling);
            let mut reversed = forward.clone();
            reversed.reverse();
            assert_eq!(op.aggregate(&reversed).unwrap(), op.aggregate(&forward).unwrap());
        }
    }

    #[test]
    fn evicted_durations_leave_no_residue() {
        let events = vec![
            ev(at(10, 0, 0), 0.1),
            ev(at(10, 1, 0), 0.2),
            ev(at(10, 2, 0), 0.3),
        ];
        let rows = aggregate(&events, 2).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], AverageRow::new(at(10, 2, 0), 0.25));
    }

    #[test]
    fn sweep_matches_rescan() {
        for (seed, w) in [(1u64, 1i64), (2, 3), (3, 10), (4, 45), (5, 500)] {
            let events = scattered(150, seed);
            for sampling in [Sampling::Bucketed, Sampling::Exact] {
                let op = MovingAverage::new(w).unwrap().with_sampling(sampling);
                let got = op.aggregate(&events).unwrap();
                let want = naive(&events, w, sampling);
                assert_eq!(got.len(), want.len());
                for (g, n) in got.iter().zip(&want) {
                    assert_eq!(g.minute, n.minute);
                    assert_eq!(
                        g.average_duration, n.average_duration,
                        "seed={seed} w={w} {sampling:?} at {}",
                        g.minute
                    );
                }
            }
        }
    }

    #[test]
    fn coverage_has_no_gaps() {
        let events = scattered(50, 11);
        let rows = aggregate(&events, 4).unwrap();
        let lo = events.iter().map(|e| e.timestamp).min().unwrap();
        let hi = events.iter().map(|e| e.timestamp).max().unwrap();
        assert_eq!(rows.first().unwrap().minute, floor_minute(lo));
        assert_eq!(rows.last().unwrap().minute, floor_minute(hi));
        for pair in rows.windows(2) {
            assert_eq!(pair[1].minute - pair[0].minute, Duration::minutes(1));
        }
    }

    #[test]
    fn exact_sampling_reproduces_delivery_report() {
        let events = vec![
            ev(at(18, 11, 8) + Duration::microseconds(509_654), 20.0),
            ev(at(18, 15, 19) + Duration::microseconds(903_159), 31.0),
            ev(at(18, 23, 19) + Duration::microseconds(903_159), 54.0),
        ];
        let op = MovingAverage::new(10).unwrap().with_sampling(Sampling::Exact);
        let rows = op.aggregate(&events).unwrap();
        assert_eq!(
            series(&rows),
            vec![
                (11, 0.0),
                (12, 20.0),
                (13, 20.0),
                (14, 20.0),
                (15, 20.0),
                (16, 25.5),
                (17, 25.5),
                (18, 25.5),
                (19, 25.5),
                (20, 25.5),
                (21, 25.5),
                (22, 31.0),
                (23, 31.0),
                (24, 42.5),
            ]
        );
    }

    #[test]
    fn operator_delegates_to_aggregate() {
        let op = MovingAverage::new(2).unwrap();
        let events = vec![ev(at(10, 0, 0), 3.0)];
        assert_eq!(op.apply(&events).unwrap(), op.aggregate(&events).unwrap());
        assert_eq!(op.name(), "MovingAverage");
    }
}
