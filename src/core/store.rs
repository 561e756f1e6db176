//! Shared conversation state.
//!
//! [`ConversationStore`] owns every conversation and is the single place the
//! transcript is mutated. Each mutation happens under the store lock and is
//! published to subscribers before the lock is released, so observers see
//! whole updates in application order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::ChatMessage;
use crate::core::conversation::{Conversation, ConversationId};
use crate::core::message::{ConversationTurn, TurnId};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Change notifications consumed by the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptUpdate {
    ConversationCreated {
        conversation_id: ConversationId,
        title: String,
    },
    TurnAppended {
        conversation_id: ConversationId,
        turn: ConversationTurn,
    },
    DeltaApplied {
        conversation_id: ConversationId,
        turn_id: TurnId,
        fragment: String,
    },
    ConversationRemoved {
        conversation_id: ConversationId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub turn_count: usize,
    pub in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginError {
    NotFound,
    Busy,
}

struct Entry {
    conversation: Conversation,
    in_flight: bool,
}

#[derive(Default)]
struct StoreInner {
    conversations: HashMap<ConversationId, Entry>,
    order: Vec<ConversationId>,
}

#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Mutex<StoreInner>>,
    updates: broadcast::Sender<TranscriptUpdate>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptUpdate> {
        self.updates.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: TranscriptUpdate) {
        // No subscribers is fine; the store is the source of truth.
        let _ = self.updates.send(update);
    }

    /// Creates an empty conversation titled after `first_input`.
    pub fn create(&self, first_input: &str) -> ConversationId {
        let conversation = Conversation::for_first_input(first_input);
        let id = conversation.id.clone();
        let title = conversation.title.clone();

        let mut inner = self.lock();
        inner.order.push(id.clone());
        inner.conversations.insert(
            id.clone(),
            Entry {
                conversation,
                in_flight: false,
            },
        );
        self.publish(TranscriptUpdate::ConversationCreated {
            conversation_id: id.clone(),
            title,
        });
        debug!(conversation = %id, "conversation created");
        id
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.lock().conversations.contains_key(id)
    }

    pub fn snapshot(&self, id: &ConversationId) -> Option<Conversation> {
        self.lock()
            .conversations
            .get(id)
            .map(|entry| entry.conversation.clone())
    }

    /// Summaries of every conversation, most recently created first.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.conversations.get(id))
            .map(|entry| ConversationSummary {
                id: entry.conversation.id.clone(),
                title: entry.conversation.title.clone(),
                created_at: entry.conversation.created_at,
                turn_count: entry.conversation.turns.len(),
                in_flight: entry.in_flight,
            })
            .collect()
    }

    /// Deletes a conversation. A request still streaming into it stops
    /// applying fragments at its next chunk.
    pub fn remove(&self, id: &ConversationId) -> Option<Conversation> {
        let mut inner = self.lock();
        let entry = inner.conversations.remove(id)?;
        inner.order.retain(|existing| existing != id);
        self.publish(TranscriptUpdate::ConversationRemoved {
            conversation_id: id.clone(),
        });
        debug!(conversation = %id, in_flight = entry.in_flight, "conversation removed");
        Some(entry.conversation)
    }

    pub fn is_in_flight(&self, id: &ConversationId) -> bool {
        self.lock()
            .conversations
            .get(id)
            .is_some_and(|entry| entry.in_flight)
    }

    /// Marks a conversation as having a request in flight.
    ///
    /// Fails with [`BeginError::Busy`] if one is already streaming. The mark is
    /// cleared when the returned guard is dropped.
    pub fn begin_request(&self, id: &ConversationId) -> Result<InFlightGuard, BeginError> {
        let mut inner = self.lock();
        let entry = inner.conversations.get_mut(id).ok_or(BeginError::NotFound)?;
        if entry.in_flight {
            return Err(BeginError::Busy);
        }
        entry.in_flight = true;
        Ok(InFlightGuard {
            store: self.clone(),
            id: id.clone(),
        })
    }

    fn end_request(&self, id: &ConversationId) {
        if let Some(entry) = self.lock().conversations.get_mut(id) {
            entry.in_flight = false;
        }
    }

    /// Wire representation of every turn currently in the conversation.
    pub fn api_messages(&self, id: &ConversationId) -> Option<Vec<ChatMessage>> {
        self.lock()
            .conversations
            .get(id)
            .map(|entry| entry.conversation.to_api_messages())
    }

    pub fn append_turn(&self, id: &ConversationId, turn: ConversationTurn) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.conversations.get_mut(id) else {
            return false;
        };
        entry.conversation.turns.push(turn.clone());
        self.publish(TranscriptUpdate::TurnAppended {
            conversation_id: id.clone(),
            turn,
        });
        true
    }

    /// Applies one streamed fragment to the conversation's transcript.
    pub fn apply_delta(&self, id: &ConversationId, fragment: &str) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.conversations.get_mut(id) else {
            return false;
        };

        let (turn, created) = entry.conversation.apply_delta(fragment);
        let update = if created {
            TranscriptUpdate::TurnAppended {
                conversation_id: id.clone(),
                turn: turn.clone(),
            }
        } else {
            TranscriptUpdate::DeltaApplied {
                conversation_id: id.clone(),
                turn_id: turn.id.clone(),
                fragment: fragment.to_string(),
            }
        };
        self.publish(update);
        true
    }
}

/// Clears the in-flight mark of a conversation when dropped.
pub struct InFlightGuard {
    store: ConversationStore,
    id: ConversationId,
}

impl InFlightGuard {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.store.end_request(&self.id);
    }
}
