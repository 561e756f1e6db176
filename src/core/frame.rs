//! Splits a chunked byte stream into complete lines.
//!
//! Chunks arrive at arbitrary boundaries, including the middle of a line or
//! of a multi-byte UTF-8 sequence. Bytes are buffered until a `\n` is seen,
//! so each frame is decoded only once it is complete.

use memchr::memchr;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    start: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next chunk received from the network.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete line with its `\n` (and a trailing `\r`)
    /// removed, or `None` when only a partial line remains.
    pub fn next_frame(&mut self) -> Option<String> {
        let pending = &self.buffer[self.start..];
        let newline_pos = memchr(b'\n', pending)?;

        let mut line = &pending[..newline_pos];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }

        let frame = match std::str::from_utf8(line) {
            Ok(text) => text.to_owned(),
            Err(err) => {
                warn!(error = %err, "invalid UTF-8 in stream line, decoding lossily");
                String::from_utf8_lossy(line).into_owned()
            }
        };

        self.start += newline_pos + 1;
        Some(frame)
    }

    /// Lazily yields every line completed so far.
    pub fn frames(&mut self) -> impl Iterator<Item = String> + '_ {
        std::iter::from_fn(move || self.next_frame())
    }

    /// Number of buffered bytes not yet terminated by a line break.
    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Closes the splitter. A trailing partial line is discarded; the number
    /// of dropped bytes is returned.
    pub fn finish(self) -> usize {
        let dropped = self.pending_len();
        if dropped > 0 {
            debug!(dropped, "discarding unterminated trailing line at stream close");
        }
        dropped
    }
}
