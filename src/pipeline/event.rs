//! Output events flowing from the run controller to the transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Semantic kind of an [`OutputEvent`].
///
/// Serialized in camelCase, which is also the wire `type` of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Info,
    Log,
    Stdout,
    PackageFiles,
    PackageFilesWithUpdates,
    BranchesInfoExtended,
    Success,
    Warning,
    Error,
    Complete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Info => "info",
            EventKind::Log => "log",
            EventKind::Stdout => "stdout",
            EventKind::PackageFiles => "packageFiles",
            EventKind::PackageFilesWithUpdates => "packageFilesWithUpdates",
            EventKind::BranchesInfoExtended => "branchesInfoExtended",
            EventKind::Success => "success",
            EventKind::Warning => "warning",
            EventKind::Error => "error",
            EventKind::Complete => "complete",
        }
    }

    /// Parse a wire `type` value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "info" => EventKind::Info,
            "log" => EventKind::Log,
            "stdout" => EventKind::Stdout,
            "packageFiles" => EventKind::PackageFiles,
            "packageFilesWithUpdates" => EventKind::PackageFilesWithUpdates,
            "branchesInfoExtended" => EventKind::BranchesInfoExtended,
            "success" => EventKind::Success,
            "warning" => EventKind::Warning,
            "error" => EventKind::Error,
            "complete" => EventKind::Complete,
            _ => return None,
        };
        Some(kind)
    }

    /// Kinds after which a client stops consuming the stream.
    pub fn is_client_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Success | EventKind::Warning | EventKind::Complete
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified unit of progress information. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub kind: EventKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl OutputEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(kind: EventKind, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            payload,
            timestamp,
        }
    }

    /// Lifecycle event whose payload is a plain message string.
    pub fn message(kind: EventKind, message: impl Into<String>) -> Self {
        Self::new(kind, Value::String(message.into()))
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::message(EventKind::Info, message)
    }
}
