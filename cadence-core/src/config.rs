use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub kind: String, // "jsonl" | "csv"
    pub path: PathBuf,
    #[serde(default = "default_time_field")]
    pub time_field: String,
    #[serde(default = "default_duration_field")]
    pub duration_field: String,
}

fn default_time_field() -> String {
    "timestamp".into()
}

fn default_duration_field() -> String {
    "duration".into()
}

/// How event timestamps meet the sampled minute boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// Events count from the minute they fall in. The series covers the
    /// first through the last event's minute.
    #[default]
    Bucketed,
    /// Events count once their exact timestamp is reached, so an event at
    /// 18:11:08 first shows at 18:12. The series runs one minute past the
    /// last event's minute.
    Exact,
}

impl FromStr for Sampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bucketed" => Ok(Sampling::Bucketed),
            "exact" => Ok(Sampling::Exact),
            other => Err(Error::Config(format!("unsupported sampling: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WindowConfig {
    pub size: String, // e.g. "10m", "1h", "10"
    #[serde(default)]
    pub sampling: Option<Sampling>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SinkConfig {
    pub kind: String, // "stdout" | "file"
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub window: WindowConfig,
    pub sink: SinkConfig,
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        match self.source.kind.as_str() {
            "jsonl" | "csv" => {}
            other => return Err(Error::Config(format!("unsupported source kind: {}", other))),
        }
        match self.sink.kind.as_str() {
            "stdout" => {}
            "file" if self.sink.path.is_some() => {}
            "file" => return Err(Error::Config("sink.path must be set for a file sink".into())),
            other => return Err(Error::Config(format!("unsupported sink kind: {}", other))),
        }
        self.window_minutes().map(|_| ())
    }

    pub fn window_minutes(&self) -> Result<i64> {
        parse_window_minutes(&self.window.size)
    }
}

/// Parse a window length such as "10m", "2h", "600s" or a bare "10" (minutes).
///
/// Only positive whole numbers of minutes are accepted.
pub fn parse_window_minutes(s: &str) -> Result<i64> {
    let invalid = || Error::InvalidWindow { value: s.to_string() };
    let t = s.trim();
    let (num, secs_per_unit) = if let Some(num) = t.strip_suffix('h') {
        (num, 3_600)
    } else if let Some(num) = t.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = t.strip_suffix('s') {
        (num, 1)
    } else {
        (t, 60)
    };
    let n = num.trim().parse::<i64>().map_err(|_| invalid())?;
    let secs = n.checked_mul(secs_per_unit).ok_or_else(invalid)?;
    if secs <= 0 || secs % 60 != 0 {
        return Err(invalid());
    }
    Ok(secs / 60)
}
