//! Common test utilities and helpers
//!
//! The external tool is replaced by `sh -c <script>`, so tests only need a
//! POSIX shell.

#![allow(dead_code)]

use futures::StreamExt;
use renovate_playground::pipeline::{EventKind, OutputEvent};
use renovate_playground::run::{
    ExitPolicy, RunController, RunError, RunRequest, RunStream, ToolSettings,
};
use serde_json::json;
use std::time::{Duration, Instant};

pub const REPOSITORY: &str = "https://github.com/acme/widgets";

/// Tool settings that run `script` with `sh -c`.
pub fn fake_tool(script: &str) -> ToolSettings {
    ToolSettings {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        termination_grace: Duration::from_millis(500),
        ..ToolSettings::default()
    }
}

pub fn controller_for(script: &str) -> RunController {
    RunController::new(fake_tool(script), ExitPolicy::default())
}

pub fn request() -> RunRequest {
    RunRequest::new(
        "ghp_test_token",
        REPOSITORY,
        json!({"extends": ["config:recommended"]}),
    )
    .expect("valid request")
}

/// Drain a run stream, panicking if it does not end within ten seconds.
pub async fn collect(stream: RunStream) -> Vec<Result<OutputEvent, RunError>> {
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("run stream did not end")
}

pub fn kinds(events: &[Result<OutputEvent, RunError>]) -> Vec<EventKind> {
    events
        .iter()
        .filter_map(|e| e.as_ref().ok())
        .map(|e| e.kind)
        .collect()
}

/// Text of an unstructured event, or the message of a lifecycle event.
pub fn text(event: &OutputEvent) -> String {
    match &event.payload {
        serde_json::Value::String(s) => s.clone(),
        payload => payload["original"].as_str().unwrap_or_default().to_string(),
    }
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
