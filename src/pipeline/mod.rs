//! Output pipeline: line framing, log classification and the event model

pub mod classifier;
pub mod event;
pub mod framer;

pub use classifier::{classify_line, default_kind, normalize_level, structured_kind};
pub use event::{EventKind, OutputEvent};
pub use framer::{frame_lines, FramedLine, LineFramer, StreamSource};
