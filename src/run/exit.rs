//! Mapping from tool exit status to terminal stream events

use serde::{Deserialize, Serialize};

use crate::pipeline::{EventKind, OutputEvent};
use crate::subprocess::ExitStatus;

/// Exit codes in `1..=max_non_fatal_code` are reported as warnings rather
/// than failures. The tool uses 1 for "finished with problems".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    pub max_non_fatal_code: i32,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            max_non_fatal_code: 1,
        }
    }
}

impl ExitPolicy {
    /// Events emitted after the process has exited, before `complete`.
    ///
    /// A process killed by a signal has no exit code and is treated as a
    /// fatal failure.
    pub fn terminal_events(&self, status: ExitStatus) -> Vec<OutputEvent> {
        match status {
            ExitStatus::Success => vec![OutputEvent::message(
                EventKind::Success,
                completed_message(0),
            )],
            ExitStatus::Error(code) if (1..=self.max_non_fatal_code).contains(&code) => {
                vec![OutputEvent::message(
                    EventKind::Warning,
                    completed_message(code),
                )]
            }
            ExitStatus::Error(code) => vec![
                OutputEvent::message(EventKind::Warning, completed_message(code)),
                OutputEvent::message(EventKind::Error, failed_message(code.to_string())),
            ],
            ExitStatus::Signal(signal) => vec![
                OutputEvent::message(
                    EventKind::Warning,
                    format!("Renovate process terminated by signal {}", signal),
                ),
                OutputEvent::message(
                    EventKind::Error,
                    failed_message(format!("signal {}", signal)),
                ),
            ],
        }
    }
}

fn completed_message(code: i32) -> String {
    format!("Renovate process completed with exit code {}", code)
}

fn failed_message(code: String) -> String {
    format!("Process failed with exit code {}. Check logs for details.", code)
}
