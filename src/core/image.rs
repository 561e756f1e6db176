//! Reading generated images out of a non-streaming completion.
//!
//! Image-capable models answer in several shapes. The first one that yields
//! a URL wins, in this order: `message.images[]`, an `image_url` content
//! part, a bare `image` part, and finally base64 `inline_data`.

use serde_json::Value;

const DEFAULT_INLINE_MIME: &str = "image/png";

fn first_message(response: &Value) -> Option<&Value> {
    response.pointer("/choices/0/message")
}

/// Returns the URL of the first image in `response`, as an `https:` or
/// `data:` URL.
pub fn extract_image_url(response: &Value) -> Option<String> {
    let message = first_message(response)?;

    if let Some(url) = message
        .pointer("/images/0/image_url/url")
        .and_then(Value::as_str)
    {
        return Some(url.to_string());
    }

    let parts = message.get("content")?.as_array()?;

    let tagged = parts
        .iter()
        .find(|part| part.get("type").and_then(Value::as_str) == Some("image_url"))
        .and_then(|part| part.pointer("/image_url/url"))
        .and_then(Value::as_str);
    if let Some(url) = tagged {
        return Some(url.to_string());
    }

    let bare = parts
        .iter()
        .find(|part| {
            part.get("type").and_then(Value::as_str) == Some("image")
                || part.get("image_url").is_some()
        })
        .and_then(|part| {
            part.pointer("/image_url/url")
                .or_else(|| part.get("url"))
                .and_then(Value::as_str)
        });
    if let Some(url) = bare {
        return Some(url.to_string());
    }

    parts.iter().find_map(|part| {
        let inline = part.get("inline_data")?;
        let data = inline.get("data")?.as_str().filter(|data| !data.is_empty())?;
        let mime = inline
            .get("mime_type")
            .and_then(Value::as_str)
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_INLINE_MIME);
        Some(format!("data:{mime};base64,{data}"))
    })
}

/// Text the model sent alongside the image, when its content is plain text.
pub fn extract_image_caption(response: &Value) -> Option<&str> {
    first_message(response)?
        .get("content")?
        .as_str()
        .filter(|text| !text.trim().is_empty())
}
