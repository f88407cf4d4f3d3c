//! cadence-io: file sources and sinks.
//! - `FileSource`: reads JSONL or CSV translation events
//! - `FileSink`: writes one JSON line per average row to stdout or a file

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cadence_core::{AverageRow, Error, EventSource, Result, RowSink, TranslationEvent};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

pub mod decode;

pub use decode::{decode_event, parse_event_time};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Supported file formats for `FileSource`.
pub enum FileFormat {
    Jsonl,
    Csv,
}

impl std::str::FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jsonl" | "json" => Ok(FileFormat::Jsonl),
            "csv" => Ok(FileFormat::Csv),
            other => Err(Error::Config(format!("unsupported source kind: {}", other))),
        }
    }
}

/// Reads a file of translation events.
/// - `time_field`: timestamp field (naive `YYYY-MM-DD HH:MM:SS.ffffff`, RFC 3339 or epoch ms)
/// - `duration_field`: numeric duration field
pub struct FileSource {
    pub path: PathBuf,
    pub format: FileFormat,
    pub time_field: String,
    pub duration_field: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            path: path.into(),
            format,
            time_field: "timestamp".into(),
            duration_field: "duration".into(),
        }
    }

    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileFormat::Jsonl)
    }

    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileFormat::Csv)
    }

    pub fn with_time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = field.into();
        self
    }

    pub fn with_duration_field(mut self, field: impl Into<String>) -> Self {
        self.duration_field = field.into();
        self
    }

    fn decode(&self, line: usize, value: serde_json::Value) -> Result<TranslationEvent> {
        let ev = decode_event(value, &self.time_field, &self.duration_field)
            .map_err(|reason| Error::Decode { line, reason })?;
        cadence_core::metrics::EVENTS_READ
            .with_label_values(&[self.label()])
            .inc();
        Ok(ev)
    }

    fn label(&self) -> &'static str {
        match self.format {
            FileFormat::Jsonl => "FileSource/jsonl",
            FileFormat::Csv => "FileSource/csv",
        }
    }

    async fn read_jsonl(&self) -> Result<Vec<TranslationEvent>> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let v: serde_json::Value = serde_json::from_str(&line).map_err(|e| Error::Decode {
                line: line_no,
                reason: e.to_string(),
            })?;
            events.push(self.decode(line_no, v)?);
        }
        Ok(events)
    }

    async fn read_csv(&self) -> Result<Vec<TranslationEvent>> {
        let file = tokio::fs::read_to_string(&self.path).await?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file.as_bytes());
        let headers = rdr.headers()?.clone();
        let mut events = Vec::new();
        for row in rdr.records() {
            let row = row?;
            let line = row.position().map(|p| p.line() as usize).unwrap_or(0);
            let mut obj = serde_json::Map::new();
            for (h, v) in headers.iter().zip(row.iter()) {
                obj.insert(h.to_string(), serde_json::json!(v));
            }
            events.push(self.decode(line, serde_json::Value::Object(obj))?);
        }
        Ok(events)
    }
}

#[async_trait]
impl EventSource for FileSource {
    async fn read_events(&mut self) -> Result<Vec<TranslationEvent>> {
        let events = match self.format {
            FileFormat::Jsonl => self.read_jsonl().await?,
            FileFormat::Csv => self.read_csv().await?,
        };
        debug!(path = %self.path.display(), events = events.len(), "events decoded");
        Ok(events)
    }
}

#[derive(Serialize)]
struct RowLine {
    date: String,
    average_delivery_time: serde_json::Number,
}

/// Encode one row as a single JSON line (no trailing newline).
///
/// Whole averages are written as integers (`20`), others as decimals (`25.5`).
pub fn encode_row(row: &AverageRow) -> Result<String> {
    let avg = row.average_duration;
    let number = if avg.fract() == 0.0 && avg.abs() < 9_007_199_254_740_992.0 {
        serde_json::Number::from(avg as i64)
    } else {
        serde_json::Number::from_f64(avg)
            .ok_or_else(|| anyhow::anyhow!("average for {} is not finite", row.minute))?
    };
    let line = RowLine {
        date: row.minute.format("%Y-%m-%d %H:%M:%S").to_string(),
        average_delivery_time: number,
    };
    Ok(serde_json::to_string(&line)?)
}

/// Writes each row as a single JSON line to stdout or a file.
pub struct FileSink {
    out: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    label: &'static str,
}

impl FileSink {
    pub fn stdout() -> Self {
        Self {
            out: BufWriter::new(Box::new(tokio::io::stdout())),
            label: "FileSink/stdout",
        }
    }

    /// Create (or truncate) `path` so output from an earlier run never survives.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = tokio::fs::File::create(path.as_ref()).await?;
        Ok(Self {
            out: BufWriter::new(Box::new(file)),
            label: "FileSink/file",
        })
    }
}

#[async_trait]
impl RowSink for FileSink {
    async fn write_row(&mut self, row: &AverageRow) -> Result<()> {
        let line = encode_row(row)?;
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        cadence_core::metrics::BYTES_WRITTEN
            .with_label_values(&[self.label])
            .inc_by((line.len() + 1) as u64);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.out.flush().await?;
        Ok(())
    }
}
