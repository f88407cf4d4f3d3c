//! Field-level decoding shared by the JSONL and CSV readers.

use cadence_core::TranslationEvent;
use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Accepts integer epoch milliseconds, RFC 3339, or a naive
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` read as UTC.
pub fn parse_event_time(v: &serde_json::Value) -> Option<DateTime<Utc>> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        serde_json::Value::String(s) => parse_time_str(s),
        _ => None,
    }
}

pub fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(ms);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|t| t.and_utc())
}

pub fn parse_duration(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Split one decoded record into a typed event; the remaining fields become
/// the payload. Errors are human-readable reasons, line numbers are added by
/// the caller.
pub fn decode_event(
    value: serde_json::Value,
    time_field: &str,
    duration_field: &str,
) -> Result<TranslationEvent, String> {
    let mut obj = match value {
        serde_json::Value::Object(o) => o,
        other => return Err(format!("expected a JSON object, got {}", other)),
    };
    let raw_ts = obj
        .remove(time_field)
        .ok_or_else(|| format!("missing field {:?}", time_field))?;
    let timestamp =
        parse_event_time(&raw_ts).ok_or_else(|| format!("unparseable {:?}: {}", time_field, raw_ts))?;
    let raw_duration = obj
        .remove(duration_field)
        .ok_or_else(|| format!("missing field {:?}", duration_field))?;
    let duration = parse_duration(&raw_duration)
        .ok_or_else(|| format!("non-numeric {:?}: {}", duration_field, raw_duration))?;
    Ok(TranslationEvent::new(timestamp, duration).with_payload(serde_json::Value::Object(obj)))
}
