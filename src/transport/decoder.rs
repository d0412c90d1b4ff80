//! Client-side reassembly and normalisation of push frames

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::{normalize_level, structured_kind, EventKind};

const FRAME_DELIMITER: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data:";

/// Malformed frame. The frame is skipped; the stream continues.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame payload is not a JSON object")]
    NotAnObject,

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Record republished to consumers after decoding a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub time: String,
    pub msg: String,
    pub level: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_files: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches_information: Option<Value>,
}

/// Shape of an envelope's `data` field.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// Object payload as written by the server.
    Record(Map<String, Value>),
    /// The same shape, string-encoded.
    Encoded(Map<String, Value>),
    /// Plain message such as a lifecycle notice.
    Text(String),
    Missing,
}

impl FramePayload {
    pub fn from_data(data: Option<&Value>) -> Self {
        match data {
            None | Some(Value::Null) => FramePayload::Missing,
            Some(Value::Object(map)) => FramePayload::Record(map.clone()),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => FramePayload::Encoded(map),
                _ => FramePayload::Text(text.clone()),
            },
            Some(other) => FramePayload::Text(other.to_string()),
        }
    }
}

/// Splits a byte stream into frames on blank lines, holding back a trailing
/// partial frame until its delimiter arrives.
///
/// Each pushed byte is normalised and scanned once, so a frame split over
/// many chunks costs time linear in its size.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    /// Prefix of `pending` already searched for a delimiter.
    scanned: usize,
    /// The last pushed byte was a `\r` not yet written to `pending`.
    carriage_return: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len() + usize::from(self.carriage_return)
    }

    /// Feed a chunk; returns one result per complete data frame. Comment-only
    /// frames (keep-alives) produce nothing.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<NormalizedRecord, DecodeError>> {
        self.append_normalized(chunk);

        let mut records = Vec::new();
        // A delimiter may straddle the previous scan boundary.
        let mut from = self.scanned.saturating_sub(FRAME_DELIMITER.len() - 1);
        while let Some(pos) = find_delimiter(&self.pending[from..]).map(|i| from + i) {
            let frame: Vec<u8> = self.pending.drain(..pos + FRAME_DELIMITER.len()).collect();
            if let Some(result) = decode_frame(&frame[..pos]) {
                records.push(result);
            }
            from = 0;
        }
        self.scanned = self.pending.len();
        records
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<Result<NormalizedRecord, DecodeError>> {
        if std::mem::take(&mut self.carriage_return) {
            self.pending.push(b'\n');
        }
        self.scanned = 0;
        let frame = std::mem::take(&mut self.pending);
        decode_frame(&frame)
    }

    /// Append `chunk` with `\r\n` and lone `\r` rewritten to `\n`. A `\r`
    /// ending the chunk is held until the next byte shows which it was.
    fn append_normalized(&mut self, chunk: &[u8]) {
        self.pending.reserve(chunk.len());
        for &b in chunk {
            if std::mem::take(&mut self.carriage_return) {
                self.pending.push(b'\n');
                if b == b'\n' {
                    continue;
                }
            }
            if b == b'\r' {
                self.carriage_return = true;
            } else {
                self.pending.push(b);
            }
        }
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER)
}

/// Decode one frame. `None` when the frame carries no data lines.
pub fn decode_frame(frame: &[u8]) -> Option<Result<NormalizedRecord, DecodeError>> {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(_) => return Some(Err(DecodeError::InvalidUtf8)),
    };

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return None;
    }

    Some(decode_envelope(&data.join("\n")))
}

/// Normalise one envelope JSON document.
pub fn decode_envelope(json: &str) -> Result<NormalizedRecord, DecodeError> {
    let envelope = match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => map,
        _ => return Err(DecodeError::NotAnObject),
    };

    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .and_then(EventKind::parse)
        .unwrap_or(EventKind::Log);

    let envelope_time = ["time", "timestamp"]
        .iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    let payload = FramePayload::from_data(envelope.get("data"));
    let (inner, text) = match payload {
        FramePayload::Record(map) | FramePayload::Encoded(map) => (Some(map), None),
        FramePayload::Text(text) => (None, Some(text)),
        FramePayload::Missing => (None, None),
    };

    let mut record = NormalizedRecord {
        time: envelope_time.unwrap_or_else(now_text),
        msg: text
            .or_else(|| envelope.get("msg").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default(),
        level: level_or_default(envelope.get("level"), kind),
        kind,
        config: None,
        package_files: None,
        branches_information: None,
    };

    if let Some(inner) = inner {
        apply_inner(&mut record, &inner);
    }

    Ok(record)
}

fn apply_inner(record: &mut NormalizedRecord, inner: &Map<String, Value>) {
    // The raw tool record, when present, carries the companion fields.
    let original = inner
        .get("original")
        .and_then(Value::as_str)
        .and_then(|text| match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        });

    if let Some(time) = inner.get("time").and_then(Value::as_str) {
        record.time = time.to_string();
    }

    record.msg = inner
        .get("msg")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .or_else(|| original.as_ref().and_then(|o| o.get("msg")).and_then(Value::as_str))
        .or_else(|| inner.get("original").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    if let Some(level) = inner.get("level").filter(|l| !l.is_null()) {
        record.level = normalize_level(Some(level));
    }

    let structured = structured_kind(inner)
        .map(|(kind, field)| (kind, inner.get(field)))
        .or_else(|| {
            original.as_ref().and_then(|o| {
                structured_kind(o).map(|(kind, field)| (kind, o.get(field)))
            })
        });

    if let Some((kind, Some(value))) = structured {
        record.kind = kind;
        match kind {
            EventKind::PackageFilesWithUpdates => record.config = Some(value.clone()),
            EventKind::PackageFiles => record.package_files = Some(value.clone()),
            EventKind::BranchesInfoExtended => record.branches_information = Some(value.clone()),
            _ => {}
        }
    }
}

fn level_or_default(level: Option<&Value>, kind: EventKind) -> String {
    match level.filter(|l| !l.is_null()) {
        Some(level) => normalize_level(Some(level)),
        None => match kind {
            EventKind::Error => "error".to_string(),
            EventKind::Warning => "warn".to_string(),
            _ => "info".to_string(),
        },
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
