//! Classification of tool log lines into typed output events
//!
//! The tool writes one JSON object per line. A handful of messages carry
//! structured data the client aggregates; everything else is forwarded as a
//! plain log record tagged with the stream it arrived on.

use super::event::{EventKind, OutputEvent};
use super::framer::StreamSource;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Message/companion-field pairs that upgrade a record's kind, in precedence order.
const STRUCTURED_RULES: [(&str, &str, EventKind); 3] = [
    (
        "packageFiles with updates",
        "config",
        EventKind::PackageFilesWithUpdates,
    ),
    ("packageFiles", "packageFiles", EventKind::PackageFiles),
    (
        "branches info extended",
        "branchesInformation",
        EventKind::BranchesInfoExtended,
    ),
];

/// Names of every companion field that can upgrade a record.
pub const STRUCTURED_FIELDS: [&str; 3] = ["config", "packageFiles", "branchesInformation"];

/// Kind a structured record is upgraded to, plus the companion field that
/// justified it. First matching rule wins.
pub fn structured_kind(record: &Map<String, Value>) -> Option<(EventKind, &'static str)> {
    let msg = record.get("msg").and_then(Value::as_str)?;
    STRUCTURED_RULES
        .iter()
        .find(|(message, field, _)| {
            msg == *message && record.get(*field).is_some_and(|v| !v.is_null())
        })
        .map(|(_, field, kind)| (*kind, *field))
}

/// Default event kind for lines that carry no structured data.
pub fn default_kind(source: StreamSource) -> EventKind {
    match source {
        StreamSource::Stdout => EventKind::Stdout,
        StreamSource::Stderr => EventKind::Log,
    }
}

/// Level name for a record's `level` field. Numeric pino levels are mapped to names.
pub fn normalize_level(level: Option<&Value>) -> String {
    match level {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(10) => "trace",
            Some(20) => "debug",
            Some(30) => "info",
            Some(40) => "warn",
            Some(50) => "error",
            Some(60) => "fatal",
            _ => "info",
        }
        .to_string(),
        _ => "info".to_string(),
    }
}

/// Record timestamp. Returns the raw text together with its parsed value.
fn record_time(record: &Map<String, Value>) -> Option<(String, DateTime<Utc>)> {
    let raw = record.get("time")?;
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| (s.clone(), t.with_timezone(&Utc))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| (t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), t)),
        _ => None,
    }
}

fn now_text(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Classify one trimmed line from the given stream.
///
/// Never fails: a line that is not a JSON object becomes an unstructured
/// event of the stream's default kind.
pub fn classify_line(line: &str, source: StreamSource) -> OutputEvent {
    let record = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => record,
        _ => return unstructured(line, source),
    };

    let now = Utc::now();
    let (time, timestamp) = record_time(&record).unwrap_or_else(|| (now_text(now), now));

    let mut payload = Map::new();
    payload.insert("original".to_string(), Value::String(line.to_string()));
    payload.insert("time".to_string(), Value::String(time));
    payload.insert(
        "msg".to_string(),
        record
            .get("msg")
            .filter(|m| m.is_string())
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
    );
    payload.insert(
        "level".to_string(),
        Value::String(normalize_level(record.get("level"))),
    );

    let kind = match structured_kind(&record) {
        Some((kind, field)) => {
            if let Some(value) = record.get(field) {
                payload.insert(field.to_string(), value.clone());
            }
            tracing::debug!(kind = %kind, "Classified structured log record");
            kind
        }
        None => default_kind(source),
    };

    OutputEvent::with_timestamp(kind, Value::Object(payload), timestamp)
}

fn unstructured(line: &str, source: StreamSource) -> OutputEvent {
    let now = Utc::now();
    let mut payload = Map::new();
    payload.insert("original".to_string(), Value::String(line.to_string()));
    payload.insert("time".to_string(), Value::String(now_text(now)));
    OutputEvent::with_timestamp(default_kind(source), Value::Object(payload), now)
}
