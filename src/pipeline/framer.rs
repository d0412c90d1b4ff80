//! Newline framing of subprocess output
//!
//! Bytes arrive from a pipe at arbitrary boundaries. [`LineFramer`] holds back
//! the trailing partial line until its terminator shows up, and [`frame_lines`]
//! turns an async reader into a lazy stream of complete lines.

use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Which standard stream of the tool a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn name(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

/// A complete line tagged with its originating stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedLine {
    pub source: StreamSource,
    pub text: String,
}

/// Per-stream accumulator of bytes not yet terminated by a newline.
#[derive(Debug)]
pub struct LineFramer {
    source: StreamSource,
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new(source: StreamSource) -> Self {
        Self {
            source,
            pending: Vec::new(),
        }
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Bytes currently held back waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one chunk and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FramedLine> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            let raw = std::mem::take(&mut self.pending);
            lines.push(self.line_from(raw));
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);

        lines
    }

    /// Flush the residual buffer at end of stream.
    ///
    /// Returns `None` when nothing but whitespace is left over.
    pub fn finish(&mut self) -> Option<FramedLine> {
        let raw = std::mem::take(&mut self.pending);
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        Some(self.line_from(raw))
    }

    /// Drop any held-back bytes without emitting them.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    fn line_from(&self, mut raw: Vec<u8>) -> FramedLine {
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        FramedLine {
            source: self.source,
            text: String::from_utf8_lossy(&raw).into_owned(),
        }
    }
}

struct FrameState<R> {
    reader: R,
    framer: LineFramer,
    ready: VecDeque<FramedLine>,
    buf: Vec<u8>,
    done: bool,
}

/// Create a lazy line stream from a reader.
///
/// The stream ends after the reader reports EOF and the residual buffer has
/// been flushed, or right after the first read error.
pub fn frame_lines<R>(
    reader: R,
    source: StreamSource,
) -> impl Stream<Item = io::Result<FramedLine>> + Send
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let state = FrameState {
        reader,
        framer: LineFramer::new(source),
        ready: VecDeque::new(),
        buf: vec![0u8; READ_CHUNK_SIZE],
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.reader.read(&mut state.buf).await {
                Ok(0) => {
                    state.done = true;
                    if let Some(line) = state.framer.finish() {
                        state.ready.push_back(line);
                    }
                }
                Ok(n) => {
                    let lines = state.framer.push(&state.buf[..n]);
                    state.ready.extend(lines);
                }
                Err(e) => {
                    state.done = true;
                    state.framer.reset();
                    return Some((Err(e), state));
                }
            }
        }
    })
}
