//! Wire payloads exchanged with the chat completion endpoint.
//!
//! Message content is either a plain string or a list of typed parts; the
//! two shapes are modelled as [`MessageContent`] so translation from the
//! transcript is exhaustive.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Maximum number of conversation messages the service accepts per request.
pub const MAX_MESSAGES: usize = 50;

/// Maximum length, in characters, of any single text content.
pub const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Iterates over every text segment carried by this content.
    pub fn texts(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            MessageContent::Text(text) => Box::new(std::iter::once(text.as_str())),
            MessageContent::Parts(parts) => Box::new(parts.iter().filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Output kinds requested from multimodal models, e.g. `["image", "text"]`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub modalities: Option<Vec<String>>,
    pub stream: bool,
}

/// Reasons the service refuses a message list before generating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    TooManyMessages { count: usize },
    ContentTooLong { index: usize, chars: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::TooManyMessages { count } => write!(
                f,
                "conversation has {count} messages, at most {MAX_MESSAGES} are accepted"
            ),
            ValidationError::ContentTooLong { index, chars } => write!(
                f,
                "message {index} is {chars} characters long, at most {MAX_CONTENT_CHARS} are accepted"
            ),
        }
    }
}

impl Error for ValidationError {}

/// Applies the service's size limits to a message list.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), ValidationError> {
    if messages.len() > MAX_MESSAGES {
        return Err(ValidationError::TooManyMessages {
            count: messages.len(),
        });
    }

    for (index, message) in messages.iter().enumerate() {
        for text in message.content.texts() {
            let chars = text.chars().count();
            if chars > MAX_CONTENT_CHARS {
                return Err(ValidationError::ContentTooLong { index, chars });
            }
        }
    }

    Ok(())
}
