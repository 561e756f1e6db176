//! Conversation state and the transcript reducer.
//!
//! Deltas streamed from the service are folded into a [`Conversation`] by
//! [`Conversation::apply_delta`]: each fragment extends the trailing
//! assistant turn, or opens one when the transcript ends with a user turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_segmentation::UnicodeSegmentation;

use crate::api::ChatMessage;
use crate::core::constants::{ATTACHMENT_ONLY_TITLE, TITLE_ELLIPSIS, TITLE_MAX_GRAPHEMES};
use crate::core::message::{Attachment, ConversationTurn, Role};
use crate::utils::id::random_id;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
}

impl Conversation {
    /// Starts an empty conversation titled after the first submission.
    pub fn for_first_input(text: &str) -> Self {
        Self {
            id: ConversationId::generate(),
            title: derive_title(text),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// Appends a user turn. User turns are never merged with earlier turns.
    pub fn push_user_turn(
        &mut self,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> &ConversationTurn {
        self.turns.push(ConversationTurn::user(content, attachments));
        &self.turns[self.turns.len() - 1]
    }

    /// Folds one streamed fragment into the transcript.
    ///
    /// Returns the assistant turn that received the fragment and whether that
    /// turn was created by this call.
    pub fn apply_delta(&mut self, fragment: &str) -> (&ConversationTurn, bool) {
        let extend = self
            .turns
            .last()
            .is_some_and(|turn| turn.role == Role::Assistant);

        if extend {
            let index = self.turns.len() - 1;
            self.turns[index].content.push_str(fragment);
            (&self.turns[index], false)
        } else {
            self.turns.push(ConversationTurn::assistant(fragment));
            (&self.turns[self.turns.len() - 1], true)
        }
    }

    /// Wire representation of every turn, in transcript order.
    pub fn to_api_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(ConversationTurn::to_api_message)
            .collect()
    }
}

/// Derives a conversation title from the first submitted text.
///
/// Keeps the first [`TITLE_MAX_GRAPHEMES`] grapheme clusters so combining
/// marks stay attached to their base characters. Blank input yields
/// [`ATTACHMENT_ONLY_TITLE`].
pub fn derive_title(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return ATTACHMENT_ONLY_TITLE.to_string();
    }

    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= TITLE_MAX_GRAPHEMES {
        return text.to_string();
    }

    let mut title = graphemes[..TITLE_MAX_GRAPHEMES].concat();
    title.push_str(TITLE_ELLIPSIS);
    title
}
