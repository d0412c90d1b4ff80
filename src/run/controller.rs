//! Run controller
//!
//! Owns the lifecycle of one tool run: admission, workspace, subprocess,
//! output classification and the terminal events. Each admitted run executes
//! in its own task which forwards events through a bounded channel. The
//! consumer dropping its end of the channel cancels the run.

use futures::stream::{self, Stream, StreamExt};
use std::pin::{pin, Pin};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use super::admission::{AdmissionGate, AdmissionToken};
use super::error::RunError;
use super::exit::ExitPolicy;
use super::request::RunRequest;
use super::settings::ToolSettings;
use super::workspace::RunWorkspace;
use crate::pipeline::{classify_line, frame_lines, EventKind, OutputEvent, StreamSource};
use crate::subprocess::{spawn_streaming, ExitStatus, ToolProcess};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub const ALREADY_RUNNING_MESSAGE: &str =
    "Renovate process already running, please wait for it to complete";
pub const COMPLETE_MESSAGE: &str = "Stream completed";

type EventSender = mpsc::Sender<Result<OutputEvent, RunError>>;

/// Ordered events of one run. Ends after `complete`, after an error item, or
/// immediately after the rejection notice when admission fails.
///
/// Dropping the stream before it ends cancels the run.
pub struct RunStream {
    inner: ReceiverStream<Result<OutputEvent, RunError>>,
}

impl Stream for RunStream {
    type Item = Result<OutputEvent, RunError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[derive(Debug, Clone)]
pub struct RunController {
    gate: AdmissionGate,
    settings: Arc<ToolSettings>,
    policy: ExitPolicy,
}

enum Outcome {
    Finished(ExitStatus),
    Cancelled,
}

impl RunController {
    pub fn new(settings: ToolSettings, policy: ExitPolicy) -> Self {
        Self {
            gate: AdmissionGate::new(),
            settings: Arc::new(settings),
            policy,
        }
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Start a run and return its event stream.
    ///
    /// Must be called from within a Tokio runtime. When another run is in
    /// progress the stream yields a single `info` notice and ends; the
    /// in-flight run is unaffected.
    pub fn start(&self, request: RunRequest) -> RunStream {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        match self.gate.try_acquire() {
            Some(token) => {
                let span = tracing::info_span!(
                    "run",
                    run_id = %token.run_id(),
                    repository = %request.repository()
                );
                let settings = Arc::clone(&self.settings);
                let policy = self.policy;
                tokio::spawn(execute(token, request, settings, policy, tx).instrument(span));
            }
            None => {
                tracing::info!(
                    repository = %request.repository(),
                    "Rejected run: another run is in progress"
                );
                let _ = tx.try_send(Ok(OutputEvent::info(ALREADY_RUNNING_MESSAGE)));
            }
        }

        RunStream {
            inner: ReceiverStream::new(rx),
        }
    }
}

async fn execute(
    token: AdmissionToken,
    request: RunRequest,
    settings: Arc<ToolSettings>,
    policy: ExitPolicy,
    tx: EventSender,
) {
    let outcome = match RunWorkspace::create() {
        Ok(workspace) => {
            let outcome = drive(&workspace, &request, &settings, policy, &tx).await;
            workspace.release();
            outcome
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => tracing::info!("Run finished"),
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            let _ = tx.send(Err(e)).await;
        }
    }

    // The gate must be idle by the time the consumer observes end of stream.
    drop(token);
    drop(tx);
}

async fn drive(
    workspace: &RunWorkspace,
    request: &RunRequest,
    settings: &ToolSettings,
    policy: ExitPolicy,
    tx: &EventSender,
) -> Result<(), RunError> {
    workspace.write_config(&request.tool_config())?;

    let command = settings.command(request, workspace);
    let mut process = spawn_streaming(&command).map_err(RunError::Spawn)?;

    let started = OutputEvent::info(format!(
        "Starting Renovate for {}",
        request.repository_slug()
    ));
    if tx.send(Ok(started)).await.is_err() {
        cancel(&mut process, settings).await;
        return Ok(());
    }

    let status = match stream_output(&mut process, settings, tx).await? {
        Outcome::Finished(status) => status,
        Outcome::Cancelled => {
            cancel(&mut process, settings).await;
            return Ok(());
        }
    };
    tracing::info!(code = ?status.code(), "Tool exited: {:?}", status);

    let terminal = policy
        .terminal_events(status)
        .into_iter()
        .chain(std::iter::once(OutputEvent::message(
            EventKind::Complete,
            COMPLETE_MESSAGE,
        )));
    for event in terminal {
        if tx.send(Ok(event)).await.is_err() {
            tracing::debug!("Subscriber left before terminal events were delivered");
            break;
        }
    }
    Ok(())
}

/// Forward classified output until both streams end and the process exits,
/// or until the subscriber goes away.
async fn stream_output(
    process: &mut ToolProcess,
    settings: &ToolSettings,
    tx: &EventSender,
) -> Result<Outcome, RunError> {
    let stdout = process.take_stdout().map_err(RunError::Spawn)?;
    let stderr = process.take_stderr().map_err(RunError::Spawn)?;

    let mut lines = pin!(stream::select(
        frame_lines(stdout, StreamSource::Stdout)
            .map(|r| r.map_err(|e| (StreamSource::Stdout, e))),
        frame_lines(stderr, StreamSource::Stderr)
            .map(|r| r.map_err(|e| (StreamSource::Stderr, e))),
    ));

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => return Ok(Outcome::Cancelled),
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => {
                let text = line.text.trim();
                if text.is_empty() {
                    continue;
                }
                let event = classify_line(text, line.source);
                if tx.send(Ok(event)).await.is_err() {
                    return Ok(Outcome::Cancelled);
                }
            }
            Some(Err((source, e))) => {
                process.terminate(settings.termination_grace).await;
                return Err(RunError::Output {
                    stream: source.name(),
                    source: e,
                });
            }
            None => break,
        }
    }

    let waited = tokio::select! {
        biased;
        _ = tx.closed() => None,
        status = process.wait() => Some(status),
    };
    match waited {
        Some(status) => Ok(Outcome::Finished(status.map_err(RunError::Wait)?)),
        None => Ok(Outcome::Cancelled),
    }
}

async fn cancel(process: &mut ToolProcess, settings: &ToolSettings) {
    tracing::info!(pid = ?process.pid(), "Subscriber disconnected, terminating tool");
    process.terminate(settings.termination_grace).await;
}
