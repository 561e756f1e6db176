use serde_json::Value;

use crate::core::outcome::extract_error_summary;

/// Returns the incremental text carried by a decoded event, if any.
///
/// Role-only events and keep-alives with empty content yield `None`.
pub fn extract_delta(event: &Value) -> Option<&str> {
    event
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
}

/// Detects an error object delivered inside the event stream.
pub fn extract_stream_error(event: &Value) -> Option<String> {
    event.get("error")?;
    extract_error_summary(event).filter(|summary| !summary.is_empty())
}
