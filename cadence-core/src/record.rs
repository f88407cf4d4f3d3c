use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed translation.
///
/// `payload` carries every other field of the source record untouched
/// (client name, language pair, word count, ...). Nothing in the pipeline
/// reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationEvent {
    pub timestamp: DateTime<Utc>,
    pub duration: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TranslationEvent {
    pub fn new(timestamp: DateTime<Utc>, duration: f64) -> Self {
        Self {
            timestamp,
            duration,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// One sampled minute of the trailing average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageRow {
    /// Start of the sampled minute (seconds and sub-seconds are zero).
    pub minute: DateTime<Utc>,
    pub average_duration: f64,
}

impl AverageRow {
    pub fn new(minute: DateTime<Utc>, average_duration: f64) -> Self {
        Self {
            minute,
            average_duration,
        }
    }
}
