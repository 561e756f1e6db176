//! Terminal results of one orchestrated request.
//!
//! Every failure carries a short, localized message suitable for direct
//! display. Raw transport errors are logged, never shown.

use serde_json::Value;
use std::fmt;

pub const MSG_RATE_LIMITED: &str = "बहुत ज्यादा requests, कृपया थोड़ी देर बाद कोशिश करें।";
pub const MSG_QUOTA_EXHAUSTED: &str = "Credits समाप्त हो गए हैं।";
pub const MSG_UNAUTHORIZED: &str = "कृपया दोबारा लॉग इन करें।";
pub const MSG_TRANSPORT: &str = "AI से जुड़ने में समस्या हुई";
pub const MSG_NO_BODY: &str = "सर्वर से कोई जवाब नहीं मिला";
pub const MSG_PROTOCOL: &str = "AI का जवाब पढ़ने में समस्या हुई";
pub const MSG_INVALID_REQUEST: &str =
    "संदेश बहुत लंबा है या बातचीत में बहुत ज़्यादा संदेश हैं।";
pub const MSG_CONVERSATION_NOT_FOUND: &str = "बातचीत नहीं मिली।";
pub const MSG_EMPTY_INPUT: &str = "कृपया कोई संदेश लिखें या फ़ाइल जोड़ें।";
pub const MSG_BUSY: &str = "पिछला जवाब अभी आ रहा है, कृपया प्रतीक्षा करें।";
pub const MSG_CANCELLED: &str = "जवाब रोक दिया गया।";
pub const MSG_IMAGE_PROMPT_REQUIRED: &str = "कृपया image के लिए description दें";
pub const MSG_IMAGE_FAILED: &str = "Image generate करने में समस्या हुई";
pub const MSG_IMAGE_MISSING: &str = "Image generate नहीं हो पाई, कृपया फिर से कोशिश करें";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    RateLimited,
    QuotaExhausted,
    Unauthorized,
    TransportError,
    ProtocolError,
    /// Rejected for size: too many messages or a text over the limit.
    InvalidRequest,
    /// Another request is still streaming into the same conversation.
    Busy,
    /// The caller cancelled the request before it completed.
    Cancelled,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RateLimited => "rate_limited",
            OutcomeKind::QuotaExhausted => "quota_exhausted",
            OutcomeKind::Unauthorized => "unauthorized",
            OutcomeKind::TransportError => "transport_error",
            OutcomeKind::ProtocolError => "protocol_error",
            OutcomeKind::InvalidRequest => "invalid_request",
            OutcomeKind::Busy => "busy",
            OutcomeKind::Cancelled => "cancelled",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            OutcomeKind::Success => "",
            OutcomeKind::RateLimited => MSG_RATE_LIMITED,
            OutcomeKind::QuotaExhausted => MSG_QUOTA_EXHAUSTED,
            OutcomeKind::Unauthorized => MSG_UNAUTHORIZED,
            OutcomeKind::TransportError => MSG_TRANSPORT,
            OutcomeKind::ProtocolError => MSG_PROTOCOL,
            OutcomeKind::InvalidRequest => MSG_INVALID_REQUEST,
            OutcomeKind::Busy => MSG_BUSY,
            OutcomeKind::Cancelled => MSG_CANCELLED,
        }
    }

    /// Maps a non-success HTTP status onto the outcome taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => OutcomeKind::InvalidRequest,
            401 => OutcomeKind::Unauthorized,
            402 => OutcomeKind::QuotaExhausted,
            429 => OutcomeKind::RateLimited,
            _ => OutcomeKind::TransportError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl RequestOutcome {
    pub fn new(kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        Self::of(OutcomeKind::Success)
    }

    /// Outcome of `kind` with its localized default message.
    pub fn of(kind: OutcomeKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// Builds the outcome for a non-success response from its status and body.
    ///
    /// The message comes from the body's error field when the service sent
    /// one, otherwise from the kind's localized fallback.
    pub fn from_error_response(status: u16, body: &str) -> Self {
        let kind = OutcomeKind::from_status(status);
        let message = serde_json::from_str::<Value>(body.trim())
            .ok()
            .and_then(|value| extract_error_summary(&value))
            .filter(|summary| !summary.is_empty())
            .unwrap_or_else(|| kind.default_message().to_string());
        Self::new(kind, message)
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

/// Pulls a one-line error summary out of an error body.
///
/// Accepts `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; whitespace runs are collapsed.
pub fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}
