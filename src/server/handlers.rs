use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use std::time::Duration;

use super::error::ApiError;
use super::ServerState;
use crate::run::{RunRequest, RunRequestBody};
use crate::transport::{encode_events, HealthStatus};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Liveness plus whether a run is in progress.
pub async fn health_check(State(state): State<ServerState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        running: state.controller.is_running(),
    })
}

/// Validate the request, then stream the run as server-sent events.
///
/// Validation failures are answered with 400 before any stream is opened.
pub async fn run_playground(
    State(state): State<ServerState>,
    body: Result<Json<RunRequestBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let request = RunRequest::try_from(body)?;

    tracing::info!(repository = %request.repository(), "Starting playground run");
    let events = state.controller.start(request);

    let sse = Sse::new(encode_events(events)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );
    Ok(([(header::CONNECTION, "keep-alive")], sse))
}
