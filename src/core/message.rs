use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::{ChatMessage, ContentPart, ImageUrl, MessageContent};
use crate::core::constants::IMAGE_FALLBACK_PROMPT;
use crate::utils::id::random_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for Role {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid conversation role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Document,
}

/// A file attached to a turn.
///
/// When `inline_data` is present it is the image URL (a `data:` URL for
/// uploads, a `data:` or `https:` URL for generated images) and fully
/// determines the preview; otherwise the attachment is metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_kind: MediaKind,
    pub inline_data: Option<String>,
}

impl Attachment {
    pub fn metadata_only(name: impl Into<String>, media_kind: MediaKind) -> Self {
        Self {
            name: name.into(),
            media_kind,
            inline_data: None,
        }
    }

    /// Returns the embeddable image URL, if this attachment is an inline image.
    pub fn inline_image(&self) -> Option<&str> {
        match self.media_kind {
            MediaKind::Image => self.inline_data.as_deref(),
            MediaKind::Document => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::generate(),
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            ..Self::new(Role::User, content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn carrying a generated image.
    pub fn generated_image(content: impl Into<String>, image: Attachment) -> Self {
        Self {
            attachments: vec![image],
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    /// Translates the turn into its wire representation.
    ///
    /// User turns carrying inline images become multi-part content: one image
    /// part per image in attachment order, then a text part. A user turn with
    /// images and no text gets [`IMAGE_FALLBACK_PROMPT`] as its text part.
    /// Images on assistant turns were generated and are not sent back.
    pub fn to_api_message(&self) -> ChatMessage {
        let images: Vec<&str> = self
            .attachments
            .iter()
            .filter_map(Attachment::inline_image)
            .collect();

        if images.is_empty() || self.is_assistant() {
            return ChatMessage::text(self.role.as_str(), self.content.clone());
        }

        let mut parts: Vec<ContentPart> = images
            .into_iter()
            .map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            })
            .collect();

        if !self.content.trim().is_empty() {
            parts.push(ContentPart::Text {
                text: self.content.clone(),
            });
        } else {
            parts.push(ContentPart::Text {
                text: IMAGE_FALLBACK_PROMPT.to_string(),
            });
        }

        ChatMessage {
            role: self.role.as_str().to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}
