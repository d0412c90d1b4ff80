//! Push-frame transport between server and client
//!
//! The server writes each run event as one SSE `data:` frame holding a
//! [`FrameEnvelope`]. The client reassembles frames from raw bytes and
//! republishes them as [`NormalizedRecord`]s.

pub mod client;
pub mod decoder;
pub mod encoder;
pub mod envelope;

pub use client::{decode_records, ClientError, HealthStatus, PlaygroundClient, RecordStream};
pub use decoder::{decode_envelope, decode_frame, DecodeError, FrameDecoder, FramePayload, NormalizedRecord};
pub use encoder::{encode_events, encode_frames};
pub use envelope::{FrameEnvelope, CONNECTED_MESSAGE};
