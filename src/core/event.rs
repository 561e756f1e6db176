//! Classifies stream lines and decodes their JSON payloads.
//!
//! A payload that fails to parse is held back once: the next line is joined
//! onto it and parsing is retried. A second failure is a protocol error.

use serde_json::Value;
use std::error::Error;
use std::fmt;
use tracing::debug;

use crate::core::constants::{COMMENT_PREFIX, DATA_PREFIX, DONE_SENTINEL};

/// Syntactic class of a single stream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment,
    /// Trimmed payload following the data prefix.
    Data(&'a str),
    /// A field this client does not use (`event:`, `id:`, `retry:`, ...).
    Other,
}

pub fn classify(line: &str) -> LineKind<'_> {
    if line.is_empty() {
        return LineKind::Blank;
    }
    if line.starts_with(COMMENT_PREFIX) {
        return LineKind::Comment;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(payload) => LineKind::Data(payload.trim()),
        None => LineKind::Other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Blank,
    Comment,
    Ignored,
    Data(Value),
    Terminator,
    /// The payload did not parse and is held until the next line arrives.
    Incomplete,
}

#[derive(Debug)]
pub enum DecodeError {
    /// The payload still failed to parse after joining the following line.
    MalformedPayload {
        payload: String,
        source: serde_json::Error,
    },
    /// The stream closed while a payload was waiting for its continuation.
    TruncatedPayload { payload: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedPayload { payload, source } => {
                write!(f, "malformed event payload {payload:?}: {source}")
            }
            DecodeError::TruncatedPayload { payload } => {
                write!(f, "stream closed inside event payload {payload:?}")
            }
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::MalformedPayload { source, .. } => Some(source),
            DecodeError::TruncatedPayload { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct EventDecoder {
    pending: Option<String>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a payload is held back waiting for its continuation.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn decode(&mut self, line: &str) -> Result<StreamEvent, DecodeError> {
        if let Some(pending) = self.pending.take() {
            return rejoin(pending, line);
        }

        let candidate = match classify(line) {
            LineKind::Blank => return Ok(StreamEvent::Blank),
            LineKind::Comment => return Ok(StreamEvent::Comment),
            LineKind::Other => return Ok(StreamEvent::Ignored),
            LineKind::Data(candidate) => candidate,
        };

        if candidate.is_empty() {
            return Ok(StreamEvent::Ignored);
        }
        if candidate == DONE_SENTINEL {
            return Ok(StreamEvent::Terminator);
        }

        match serde_json::from_str(candidate) {
            Ok(value) => Ok(StreamEvent::Data(value)),
            Err(err) => {
                debug!(error = %err, "holding unparsed payload for one rejoin attempt");
                self.pending = Some(candidate.to_string());
                Ok(StreamEvent::Incomplete)
            }
        }
    }

    /// Called when the stream closes.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        match self.pending.take() {
            Some(payload) => Err(DecodeError::TruncatedPayload { payload }),
            None => Ok(()),
        }
    }
}

fn rejoin(pending: String, line: &str) -> Result<StreamEvent, DecodeError> {
    let with_break = format!("{pending}\n{line}");
    let err = match serde_json::from_str(with_break.trim_end()) {
        Ok(value) => return Ok(StreamEvent::Data(value)),
        Err(err) => err,
    };

    // The break may have fallen inside a token, where JSON allows no whitespace.
    let joined = format!("{pending}{line}");
    match serde_json::from_str(joined.trim_end()) {
        Ok(value) => Ok(StreamEvent::Data(value)),
        Err(_) => Err(DecodeError::MalformedPayload {
            payload: pending,
            source: err,
        }),
    }
}
