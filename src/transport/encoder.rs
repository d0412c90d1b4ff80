//! Server-side encoding of run events into push frames

use axum::response::sse::Event;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;

use super::envelope::FrameEnvelope;
use crate::pipeline::{EventKind, OutputEvent};
use crate::run::{RunError, COMPLETE_MESSAGE};

struct EncoderState<S> {
    events: S,
    completed: bool,
    finished: bool,
}

/// Frame sequence for one response.
///
/// Starts with the connection notice. A run error becomes one `error` frame
/// and ends the sequence. A sequence that ends without a `complete` event
/// gets one appended, so the transport is closed exactly once either way.
pub fn encode_frames<S>(events: S) -> impl Stream<Item = FrameEnvelope> + Send
where
    S: Stream<Item = Result<OutputEvent, RunError>> + Send + Unpin + 'static,
{
    let state = EncoderState {
        events,
        completed: false,
        finished: false,
    };

    let body = stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        match state.events.next().await {
            Some(Ok(event)) => {
                if event.kind == EventKind::Complete {
                    state.completed = true;
                }
                Some((FrameEnvelope::from(event), state))
            }
            Some(Err(e)) => {
                tracing::warn!("Run ended with error: {}", e);
                state.finished = true;
                Some((FrameEnvelope::error(e), state))
            }
            None => {
                state.finished = true;
                if state.completed {
                    None
                } else {
                    let complete = OutputEvent::message(EventKind::Complete, COMPLETE_MESSAGE);
                    Some((FrameEnvelope::from(complete), state))
                }
            }
        }
    });

    stream::once(async { FrameEnvelope::connected() }).chain(body)
}

/// [`encode_frames`] rendered as SSE events, one `data:` line per frame.
pub fn encode_events<S>(events: S) -> impl Stream<Item = Result<Event, Infallible>> + Send
where
    S: Stream<Item = Result<OutputEvent, RunError>> + Send + Unpin + 'static,
{
    encode_frames(events).map(|envelope| Ok(to_sse_event(&envelope)))
}

fn to_sse_event(envelope: &FrameEnvelope) -> Event {
    match envelope.to_json() {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            tracing::warn!("Failed to encode {} frame: {}", envelope.kind, e);
            Event::default().comment("unencodable frame")
        }
    }
}
