use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cadence_core::config::PipelineConfig;
use cadence_core::{Executor, RunSummary};
use cadence_io::{FileFormat, FileSink, FileSource};
use cadence_ops::{MovingAverage, Sampling};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cadence",
    version,
    about = "Per-minute trailing average of translation delivery times"
)]
struct Cli {
    /// Event file: one JSON object per line (or CSV with --format csv)
    #[arg(
        long = "input_file",
        visible_alias = "input-file",
        required_unless_present = "config",
        conflicts_with = "config"
    )]
    input_file: Option<PathBuf>,
    /// Trailing window length in minutes
    #[arg(
        long = "window_size",
        visible_alias = "window-size",
        value_parser = clap::value_parser!(i64).range(1..),
        required_unless_present = "config",
        conflicts_with = "config"
    )]
    window_size: Option<i64>,
    /// Where to write rows; stdout when omitted
    #[arg(long = "output_file", visible_alias = "output-file", conflicts_with = "config")]
    output_file: Option<PathBuf>,
    #[arg(long, value_parser = ["bucketed", "exact"], conflicts_with = "config")]
    sampling: Option<String>,
    #[arg(long, value_parser = ["jsonl", "csv"], conflicts_with = "config")]
    format: Option<String>,
    /// Run a pipeline described by a pipeline.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write Prometheus text metrics here after the run
    #[arg(long = "metrics_file", visible_alias = "metrics-file")]
    metrics_file: Option<PathBuf>,
}

struct Plan {
    source: FileSource,
    op: MovingAverage,
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let metrics_file = cli.metrics_file.clone();
    let plan = match cli.config.clone() {
        Some(path) => plan_from_config(&path).await?,
        None => plan_from_args(cli)?,
    };
    let summary = execute(plan).await?;
    tracing::info!(events = summary.events, rows = summary.rows, "done");
    if let Some(path) = metrics_file {
        tokio::fs::write(&path, cadence_core::metrics::render_prometheus()).await?;
    }
    Ok(())
}

fn plan_from_args(cli: Cli) -> anyhow::Result<Plan> {
    let input = cli
        .input_file
        .ok_or_else(|| anyhow::anyhow!("--input_file is required"))?;
    let window = cli
        .window_size
        .ok_or_else(|| anyhow::anyhow!("--window_size is required"))?;
    let format: FileFormat = cli.format.as_deref().unwrap_or("jsonl").parse()?;
    let sampling: Sampling = cli.sampling.as_deref().unwrap_or("bucketed").parse()?;
    Ok(Plan {
        source: FileSource::new(resolve_input(&input)?, format),
        op: MovingAverage::new(window)?.with_sampling(sampling),
        output: cli.output_file,
    })
}

async fn plan_from_config(path: &Path) -> anyhow::Result<Plan> {
    let text = tokio::fs::read_to_string(path).await?;
    let cfg = PipelineConfig::from_toml(&text)?;

    let format: FileFormat = cfg.source.kind.parse()?;
    let sampling = cfg.window.sampling.unwrap_or_default();
    let source = FileSource::new(resolve_input(&cfg.source.path)?, format)
        .with_time_field(cfg.source.time_field.clone())
        .with_duration_field(cfg.source.duration_field.clone());
    let output = match cfg.sink.kind.as_str() {
        "file" => cfg.sink.path.clone(),
        _ => None,
    };
    Ok(Plan {
        source,
        op: MovingAverage::new(cfg.window_minutes()?)?.with_sampling(sampling),
        output,
    })
}

/// Relative paths that do not exist from the working directory are retried
/// next to the executable.
fn resolve_input(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_relative() {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(path)));
        if let Some(candidate) = beside_exe.filter(|p| p.is_file()) {
            return Ok(candidate);
        }
    }
    anyhow::bail!("input file does not exist: {}", path.display())
}

async fn execute(plan: Plan) -> anyhow::Result<RunSummary> {
    tracing::info!(
        input = %plan.source.path.display(),
        window_minutes = plan.op.window_minutes(),
        sampling = ?plan.op.sampling(),
        "starting"
    );
    let sink = match &plan.output {
        Some(path) => FileSink::create(path).await?,
        None => FileSink::stdout(),
    };
    let mut exec = Executor::new();
    exec.source(plan.source).operator(plan.op).sink(sink);
    Ok(exec.run().await?)
}
