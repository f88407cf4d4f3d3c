//! cadence-core: fundamental types, traits and a basic executor.
//!
//! Goal: provide the abstractions shared by every cadence crate:
//! - `TranslationEvent`, `AverageRow`
//! - Traits: `EventSource`, `Operator`, `RowSink`
//! - A tokio-friendly batch `Executor`
//! - `Error`/`Result`, TOML `config`, Prometheus `metrics`
//!
//! Quick example:
//! ```no_run
//! use cadence_core::{AverageRow, EventSource, Operator, RowSink, TranslationEvent};
//! # #[tokio::main]
//! # async fn main() -> cadence_core::Result<()> {
//! struct MySource;
//! #[async_trait::async_trait]
//! impl EventSource for MySource {
//!     async fn read_events(&mut self) -> cadence_core::Result<Vec<TranslationEvent>> { Ok(vec![]) }
//! }
//!
//! struct MyOp;
//! impl Operator for MyOp {
//!     fn apply(&self, _events: &[TranslationEvent]) -> cadence_core::Result<Vec<AverageRow>> { Ok(vec![]) }
//! }
//!
//! struct MySink;
//! #[async_trait::async_trait]
//! impl RowSink for MySink {
//!     async fn write_row(&mut self, _row: &AverageRow) -> cadence_core::Result<()> { Ok(()) }
//! }
//!
//! let mut exec = cadence_core::Executor::new();
//! exec.source(MySource).operator(MyOp).sink(MySink);
//! exec.run().await?;
//! # Ok(()) }
//! ```

use std::time::Instant;

use tracing::info;

pub mod config;
pub mod metrics;
pub mod record;

pub use record::{AverageRow, TranslationEvent};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid window size {value:?}: expected a positive whole number of minutes")]
    InvalidWindow { value: String },
    #[error("invalid event #{index}: duration {duration} must be a finite, non-negative number")]
    InvalidEvent { index: usize, duration: f64 },
    #[error("line {line}: {reason}")]
    Decode { line: usize, reason: String },
    #[error("config: {0}")]
    Config(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Produces the complete, finite batch of events for one run.
#[async_trait::async_trait]
pub trait EventSource: Send {
    async fn read_events(&mut self) -> Result<Vec<TranslationEvent>>;
}

/// Pure transformation from a batch of events to an ordered row series.
///
/// Operators never perform I/O and keep no state between calls.
pub trait Operator: Send + Sync {
    fn apply(&self, events: &[TranslationEvent]) -> Result<Vec<AverageRow>>;

    /// Label used for metrics and logs.
    fn name(&self) -> &'static str {
        "operator"
    }
}

#[async_trait::async_trait]
pub trait RowSink: Send {
    async fn write_row(&mut self, row: &AverageRow) -> Result<()>;
    /// Flush buffered output. Called once after the last row.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Counts reported by [`Executor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub events: usize,
    pub rows: usize,
}

pub struct Executor {
    source: Option<Box<dyn EventSource>>,
    operator: Option<Box<dyn Operator>>,
    sink: Option<Box<dyn RowSink>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            source: None,
            operator: None,
            sink: None,
        }
    }

    pub fn source<S: EventSource + 'static>(&mut self, s: S) -> &mut Self {
        self.source = Some(Box::new(s));
        self
    }

    pub fn operator<O: Operator + 'static>(&mut self, o: O) -> &mut Self {
        self.operator = Some(Box::new(o));
        self
    }

    pub fn sink<K: RowSink + 'static>(&mut self, s: K) -> &mut Self {
        self.sink = Some(Box::new(s));
        self
    }

    /// Drain the source, run the operator once and write every row in order.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut source = self.source.take().ok_or_else(|| anyhow::anyhow!("no source"))?;
        let operator = self.operator.take().ok_or_else(|| anyhow::anyhow!("no operator"))?;
        let mut sink = self.sink.take().ok_or_else(|| anyhow::anyhow!("no sink"))?;

        let events = source.read_events().await?;

        let started = Instant::now();
        let rows = operator.apply(&events)?;
        metrics::AGGREGATE_LATENCY_MS.observe(started.elapsed().as_secs_f64() * 1_000.0);

        for row in &rows {
            sink.write_row(row).await?;
            metrics::ROWS_EMITTED
                .with_label_values(&[operator.name()])
                .inc();
        }
        sink.finish().await?;

        let summary = RunSummary {
            events: events.len(),
            rows: rows.len(),
        };
        info!(
            operator = operator.name(),
            events = summary.events,
            rows = summary.rows,
            "pipeline finished"
        );
        Ok(summary)
    }
}

pub mod prelude {
    pub use super::{
        AverageRow, Error, EventSource, Executor, Operator, Result, RowSink, RunSummary,
        TranslationEvent,
    };
}
