use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::{EventKind, OutputEvent};

pub const CONNECTED_MESSAGE: &str = "Connected to Renovate stream";

/// JSON body of one push frame: `{data, type, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEnvelope {
    pub data: Value,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: String,
}

impl FrameEnvelope {
    pub fn new(kind: EventKind, data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            kind,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// First frame on every stream, before any run output.
    pub fn connected() -> Self {
        Self::new(
            EventKind::Info,
            Value::String(CONNECTED_MESSAGE.to_string()),
            Utc::now(),
        )
    }

    /// Terminal frame carrying a run failure.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::new(
            EventKind::Error,
            Value::String(format!("Error: {}", message)),
            Utc::now(),
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<OutputEvent> for FrameEnvelope {
    fn from(event: OutputEvent) -> Self {
        Self::new(event.kind, event.payload, event.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let envelope = FrameEnvelope::new(EventKind::Stdout, json!({"original": "hi"}), timestamp);
        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "data": {"original": "hi"},
                "type": "stdout",
                "timestamp": "2024-05-01T10:00:00.000Z"
            })
        );
    }

    #[test]
    fn test_error_frame_prefixes_message() {
        let envelope = FrameEnvelope::error("boom");
        assert_eq!(envelope.kind, EventKind::Error);
        assert_eq!(envelope.data, "Error: boom");
    }
}
