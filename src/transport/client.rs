//! HTTP client for a playground server

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;

use super::decoder::{FrameDecoder, NormalizedRecord};
use crate::run::RunRequestBody;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected the request ({status}): {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub running: bool,
}

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<NormalizedRecord, ClientError>> + Send>>;

#[derive(Debug, Clone)]
pub struct PlaygroundClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlaygroundClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Post a run and stream its normalised records.
    ///
    /// The stream ends after a `success`, `warning` or `complete` record, at
    /// which point the connection is released. Malformed frames are skipped.
    pub async fn run(&self, body: &RunRequestBody) -> Result<RecordStream, ClientError> {
        tracing::debug!(repository = ?body.repository, "Posting run to {}", self.base_url);
        let response = self
            .http
            .post(format!("{}/api/playground/run", self.base_url))
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(Box::pin(decode_records(Box::pin(response.bytes_stream()))))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

struct DecodeState<S> {
    bytes: Option<S>,
    decoder: FrameDecoder,
    ready: VecDeque<NormalizedRecord>,
}

/// Decode a raw byte stream into records, stopping after the first
/// client-terminal record.
pub fn decode_records<S, B, E>(bytes: S) -> impl Stream<Item = Result<NormalizedRecord, ClientError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Some(bytes),
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                if record.kind.is_client_terminal() {
                    state.bytes = None;
                    state.ready.clear();
                }
                return Some((Ok(record), state));
            }

            let bytes = state.bytes.as_mut()?;
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(chunk.as_ref());
                    enqueue(&mut state.ready, decoded);
                }
                Some(Err(e)) => {
                    state.bytes = None;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.bytes = None;
                    if let Some(last) = state.decoder.finish() {
                        enqueue(&mut state.ready, vec![last]);
                    }
                }
            }
        }
    })
}

fn enqueue(
    ready: &mut VecDeque<NormalizedRecord>,
    decoded: Vec<Result<NormalizedRecord, super::DecodeError>>,
) {
    for result in decoded {
        match result {
            Ok(record) => ready.push_back(record),
            Err(e) => tracing::warn!("Skipping malformed frame: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EventKind;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, ClientError>> + Send + Unpin {
        let parts: Vec<Result<Vec<u8>, ClientError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(parts)
    }

    #[tokio::test]
    async fn test_stops_after_terminal_record() {
        let records: Vec<_> = decode_records(chunks(&[
            "data: {\"data\":\"Connected\",\"type\":\"info\"}\n\n",
            "data: {\"data\":\"done\",\"type\":\"success\"}\n\ndata: {\"data\":\"late\",\"type\":\"info\"}\n\n",
        ]))
        .collect()
        .await;

        let kinds: Vec<_> = records.iter().map(|r| r.as_ref().unwrap().kind).collect();
        assert_eq!(kinds, vec![EventKind::Info, EventKind::Success]);
    }

    #[tokio::test]
    async fn test_error_record_does_not_stop_consumption() {
        let records: Vec<_> = decode_records(chunks(&[
            "data: {\"data\":\"Process failed\",\"type\":\"error\"}\n\n",
            "data: {\"data\":\"Stream completed\",\"type\":\"complete\"}\n\n",
        ]))
        .collect()
        .await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let records: Vec<_> = decode_records(chunks(&[
            "data: nonsense\n\n",
            "data: {\"data\":\"x\",\"type\":\"log\"}",
        ]))
        .collect()
        .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().msg, "x");
    }
}
