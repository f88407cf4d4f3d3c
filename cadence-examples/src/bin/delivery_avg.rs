//! Trailing 10-minute average of delivery times, sampled every minute.
//! Run:
//!   cargo run -p cadence-examples --bin delivery_avg -- cadence-examples/data/deliveries.jsonl exact
//! Input JSONL fields: timestamp (naive UTC, RFC3339 or epoch ms), duration (number), anything else is carried along

use anyhow::Result;
use cadence_core::Executor;
use cadence_io::{FileSink, FileSource};
use cadence_ops::{MovingAverage, Sampling};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let input = std::env::args().nth(1).unwrap_or_else(|| {
        let p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join("deliveries.jsonl");
        p.to_string_lossy().to_string()
    });
    let sampling: Sampling = std::env::args()
        .nth(2)
        .as_deref()
        .unwrap_or("bucketed")
        .parse()?;

    let mut exec = Executor::new();
    exec.source(FileSource::jsonl(input))
        .operator(MovingAverage::new(10)?.with_sampling(sampling))
        .sink(FileSink::stdout());

    exec.run().await?;
    Ok(())
}
