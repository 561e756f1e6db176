//! The decoding half of a streamed response.
//!
//! [`StreamPipeline`] chains the frame splitter, the event decoder and the
//! delta extractor. It is fed raw network chunks and hands each text
//! fragment to a callback in arrival order, without touching the network
//! itself.

use std::error::Error;
use std::fmt;
use tracing::debug;

use crate::core::delta::{extract_delta, extract_stream_error};
use crate::core::event::{DecodeError, EventDecoder, StreamEvent};
use crate::core::frame::FrameSplitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The termination sentinel was seen; later bytes are never decoded.
    Finished,
}

#[derive(Debug)]
pub enum StreamError {
    Decode(DecodeError),
    /// The service reported an error inside the event stream.
    Service(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Decode(err) => write!(f, "{err}"),
            StreamError::Service(message) => write!(f, "service error in stream: {message}"),
        }
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StreamError::Decode(err) => Some(err),
            StreamError::Service(_) => None,
        }
    }
}

impl From<DecodeError> for StreamError {
    fn from(err: DecodeError) -> Self {
        StreamError::Decode(err)
    }
}

#[derive(Debug, Default)]
pub struct StreamPipeline {
    splitter: FrameSplitter,
    decoder: EventDecoder,
    finished: bool,
    deltas: usize,
}

impl StreamPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of fragments delivered so far.
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    /// Feeds one network chunk, calling `on_delta` for every fragment it
    /// completes.
    pub fn push_chunk<F>(&mut self, chunk: &[u8], mut on_delta: F) -> Result<Flow, StreamError>
    where
        F: FnMut(&str),
    {
        if self.finished {
            return Ok(Flow::Finished);
        }

        self.splitter.push(chunk);
        while let Some(frame) = self.splitter.next_frame() {
            match self.decoder.decode(&frame)? {
                StreamEvent::Data(event) => {
                    if let Some(message) = extract_stream_error(&event) {
                        return Err(StreamError::Service(message));
                    }
                    if let Some(fragment) = extract_delta(&event) {
                        self.deltas += 1;
                        on_delta(fragment);
                    }
                }
                StreamEvent::Terminator => {
                    debug!(deltas = self.deltas, "termination sentinel received");
                    self.finished = true;
                    return Ok(Flow::Finished);
                }
                StreamEvent::Blank
                | StreamEvent::Comment
                | StreamEvent::Ignored
                | StreamEvent::Incomplete => {}
            }
        }

        Ok(Flow::Continue)
    }

    /// Closes the pipeline once the transport has no more bytes.
    pub fn finish(mut self) -> Result<(), StreamError> {
        if self.finished {
            return Ok(());
        }
        self.decoder.finish()?;
        self.splitter.finish();
        Ok(())
    }
}

/// Decodes a complete sequence of chunks, returning every fragment.
pub fn collect_deltas<'a, I>(chunks: I) -> Result<Vec<String>, StreamError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut pipeline = StreamPipeline::new();
    let mut deltas = Vec::new();
    for chunk in chunks {
        let flow = pipeline.push_chunk(chunk, |fragment| deltas.push(fragment.to_string()))?;
        if flow == Flow::Finished {
            break;
        }
    }
    pipeline.finish()?;
    Ok(deltas)
}
