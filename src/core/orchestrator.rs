//! Owns the lifecycle of one outbound request.
//!
//! [`ChatClient::send_turn`] appends the user's turn, posts the conversation
//! to the completion endpoint and streams the reply into the
//! [`ConversationStore`]. Every call ends in exactly one [`RequestOutcome`];
//! whatever reached the transcript before a failure stays there.
//! [`ChatClient::generate_image`] follows the same lifecycle with a single
//! non-streaming request to an image-capable model.

use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{validate_messages, ChatMessage, ChatRequest};
use crate::auth::{add_auth_header, CredentialSource};
use crate::core::chat_stream::{Flow, StreamError, StreamPipeline};
use crate::core::config::Config;
use crate::core::constants::{GENERATED_IMAGE_NAME, IMAGE_READY_MESSAGE, IMAGE_REQUEST_PREFIX};
use crate::core::conversation::ConversationId;
use crate::core::image::{extract_image_caption, extract_image_url};
use crate::core::message::{Attachment, ConversationTurn, MediaKind};
use crate::core::outcome::{
    OutcomeKind, RequestOutcome, MSG_CONVERSATION_NOT_FOUND, MSG_EMPTY_INPUT, MSG_IMAGE_FAILED,
    MSG_IMAGE_MISSING, MSG_IMAGE_PROMPT_REQUIRED, MSG_NO_BODY,
};
use crate::core::store::{BeginError, ConversationStore, InFlightGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint: String,
    pub model: Option<String>,
    pub image_model: Option<String>,
    pub system_prompt: Option<String>,
}

impl ClientSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: None,
            image_model: None,
            system_prompt: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.resolved_endpoint(),
            model: Some(config.resolved_model()),
            image_model: Some(config.resolved_image_model()),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

/// Result of [`ChatClient::send_turn`] and [`ChatClient::generate_image`].
///
/// `conversation_id` names the conversation the turn went to, created if
/// none was given. It is `None` only when input was refused before any
/// conversation was chosen, so it always refers to a stored conversation
/// or to the one the caller passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub conversation_id: Option<ConversationId>,
    pub outcome: RequestOutcome,
}

impl SendReport {
    fn refused(conversation_id: Option<ConversationId>, outcome: RequestOutcome) -> Self {
        Self {
            conversation_id,
            outcome,
        }
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    settings: ClientSettings,
    credentials: Arc<dyn CredentialSource>,
    store: ConversationStore,
}

impl ChatClient {
    pub fn new(
        settings: ClientSettings,
        credentials: Arc<dyn CredentialSource>,
        store: ConversationStore,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            credentials,
            store,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Sends one user turn and streams the assistant's reply into the store.
    ///
    /// Without a `conversation_id` a new conversation is created and titled
    /// from `text`. Empty input is refused before anything is created. Once
    /// accepted, the turn stays in the transcript even when the request is
    /// then refused for size. While a request streams into a conversation,
    /// further sends to it are refused with [`OutcomeKind::Busy`]. Cancelling
    /// `cancel` stops reading, drops the connection and yields
    /// [`OutcomeKind::Cancelled`].
    pub async fn send_turn(
        &self,
        conversation_id: Option<ConversationId>,
        text: &str,
        attachments: Vec<Attachment>,
        cancel: CancellationToken,
    ) -> SendReport {
        if text.trim().is_empty() && attachments.is_empty() {
            return SendReport::refused(
                conversation_id,
                RequestOutcome::new(OutcomeKind::InvalidRequest, MSG_EMPTY_INPUT),
            );
        }

        let turn = ConversationTurn::user(text, attachments);
        let conversation_id = conversation_id.unwrap_or_else(|| self.store.create(text));
        let outcome = self.run_turn(&conversation_id, turn, &cancel).await;
        log_outcome(&conversation_id, &outcome);

        SendReport {
            conversation_id: Some(conversation_id),
            outcome,
        }
    }

    /// Asks the image model for a picture of `prompt`.
    ///
    /// The prompt is recorded as a user turn and the image arrives as an
    /// [`Attachment`] on a new assistant turn. The request is not streamed
    /// and carries only the prompt, never the conversation history.
    pub async fn generate_image(
        &self,
        conversation_id: Option<ConversationId>,
        prompt: &str,
        cancel: CancellationToken,
    ) -> SendReport {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return SendReport::refused(
                conversation_id,
                RequestOutcome::new(OutcomeKind::InvalidRequest, MSG_IMAGE_PROMPT_REQUIRED),
            );
        }

        let conversation_id = conversation_id.unwrap_or_else(|| self.store.create(prompt));
        let outcome = self.run_image(&conversation_id, prompt, &cancel).await;
        log_outcome(&conversation_id, &outcome);

        SendReport {
            conversation_id: Some(conversation_id),
            outcome,
        }
    }

    fn begin(&self, id: &ConversationId) -> Result<InFlightGuard, RequestOutcome> {
        self.store.begin_request(id).map_err(|err| match err {
            BeginError::NotFound => {
                RequestOutcome::new(OutcomeKind::InvalidRequest, MSG_CONVERSATION_NOT_FOUND)
            }
            BeginError::Busy => RequestOutcome::of(OutcomeKind::Busy),
        })
    }

    async fn run_turn(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
        cancel: &CancellationToken,
    ) -> RequestOutcome {
        let _in_flight = match self.begin(id) {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let Some(mut messages) = self.store.api_messages(id) else {
            return RequestOutcome::new(OutcomeKind::InvalidRequest, MSG_CONVERSATION_NOT_FOUND);
        };
        messages.push(turn.to_api_message());
        self.store.append_turn(id, turn);

        if let Err(err) = validate_messages(&messages) {
            warn!(conversation = %id, error = %err, "refusing oversized request");
            return RequestOutcome::of(OutcomeKind::InvalidRequest);
        }

        let request = self.build_request(messages);
        let response = match self.send(id, request, cancel).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };

        if response.content_length() == Some(0) {
            return RequestOutcome::new(OutcomeKind::TransportError, MSG_NO_BODY);
        }

        self.consume_stream(id, response, cancel).await
    }

    async fn run_image(
        &self,
        id: &ConversationId,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> RequestOutcome {
        let _in_flight = match self.begin(id) {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let turn = ConversationTurn::user(prompt, Vec::new());
        let message = turn.to_api_message();
        self.store.append_turn(id, turn);

        if let Err(err) = validate_messages(std::slice::from_ref(&message)) {
            warn!(conversation = %id, error = %err, "refusing oversized image prompt");
            return RequestOutcome::of(OutcomeKind::InvalidRequest);
        }

        let request = self.build_image_request(prompt);
        let response = match self.send(id, request, cancel).await {
            Ok(response) => response,
            Err(outcome) if outcome.kind == OutcomeKind::TransportError => {
                return RequestOutcome::new(OutcomeKind::TransportError, MSG_IMAGE_FAILED)
            }
            Err(outcome) => return outcome,
        };

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RequestOutcome::of(OutcomeKind::Cancelled),
            body = response.bytes() => body,
        };
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                warn!(conversation = %id, error = %err, "image response read failed");
                return RequestOutcome::new(OutcomeKind::TransportError, MSG_IMAGE_FAILED);
            }
        };

        let value: Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(err) => {
                warn!(conversation = %id, error = %err, "image response is not JSON");
                return RequestOutcome::of(OutcomeKind::ProtocolError);
            }
        };

        let Some(url) = extract_image_url(&value) else {
            warn!(conversation = %id, response = %value, "no image in response");
            return RequestOutcome::new(OutcomeKind::ProtocolError, MSG_IMAGE_MISSING);
        };

        let caption = extract_image_caption(&value).unwrap_or(IMAGE_READY_MESSAGE);
        let image = Attachment {
            name: GENERATED_IMAGE_NAME.to_string(),
            media_kind: MediaKind::Image,
            inline_data: Some(url),
        };
        if !self
            .store
            .append_turn(id, ConversationTurn::generated_image(caption, image))
        {
            debug!(conversation = %id, "conversation removed during image generation");
            return RequestOutcome::of(OutcomeKind::Cancelled);
        }

        RequestOutcome::success()
    }

    /// Sends `request`, racing every await against `cancel`. Non-success
    /// statuses are read and mapped here.
    async fn send(
        &self,
        id: &ConversationId,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, RequestOutcome> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RequestOutcome::of(OutcomeKind::Cancelled)),
            result = request.send() => result,
        };

        let response = response.map_err(|err| {
            warn!(conversation = %id, error = %err, "request failed");
            RequestOutcome::of(OutcomeKind::TransportError)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RequestOutcome::of(OutcomeKind::Cancelled)),
            body = response.text() => body.unwrap_or_default(),
        };
        warn!(conversation = %id, status = status.as_u16(), body = %body, "service returned an error");
        Err(RequestOutcome::from_error_response(status.as_u16(), &body))
    }

    fn build_image_request(&self, prompt: &str) -> reqwest::RequestBuilder {
        debug!(endpoint = %self.settings.endpoint, "posting image request");

        let body = ChatRequest {
            model: self.settings.image_model.clone(),
            messages: vec![ChatMessage::text(
                "user",
                format!("{IMAGE_REQUEST_PREFIX}{prompt}"),
            )],
            modalities: Some(vec!["image".to_string(), "text".to_string()]),
            stream: false,
        };

        let request = self
            .http
            .post(&self.settings.endpoint)
            .header("Accept", "application/json")
            .json(&body);
        add_auth_header(request, self.credentials.as_ref())
    }

    fn build_request(&self, conversation: Vec<ChatMessage>) -> reqwest::RequestBuilder {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(prompt) = self
            .settings
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
        {
            messages.push(ChatMessage::text("system", prompt));
        }
        messages.extend(conversation);

        debug!(
            endpoint = %self.settings.endpoint,
            messages = messages.len(),
            "posting chat request"
        );

        let body = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            modalities: None,
            stream: true,
        };

        let request = self
            .http
            .post(&self.settings.endpoint)
            .header("Accept", "text/event-stream")
            .json(&body);
        add_auth_header(request, self.credentials.as_ref())
    }

    async fn consume_stream(
        &self,
        id: &ConversationId,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> RequestOutcome {
        let mut body = response.bytes_stream();
        let mut pipeline = StreamPipeline::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(
                        conversation = %id,
                        deltas = pipeline.delta_count(),
                        "stream cancelled, releasing connection"
                    );
                    return RequestOutcome::of(OutcomeKind::Cancelled);
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let mut orphaned = false;
                    let flow = pipeline.push_chunk(&chunk, |fragment| {
                        orphaned |= !self.store.apply_delta(id, fragment);
                    });
                    if orphaned {
                        debug!(conversation = %id, "conversation removed mid-stream");
                        return RequestOutcome::of(OutcomeKind::Cancelled);
                    }
                    match flow {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Finished) => return RequestOutcome::success(),
                        Err(err) => return stream_failure(id, err),
                    }
                }
                Some(Err(err)) => {
                    warn!(conversation = %id, error = %err, "stream read failed");
                    return RequestOutcome::of(OutcomeKind::TransportError);
                }
                None => break,
            }
        }

        debug!(conversation = %id, "transport closed without termination sentinel");
        match pipeline.finish() {
            Ok(()) => RequestOutcome::success(),
            Err(err) => stream_failure(id, err),
        }
    }
}

fn log_outcome(id: &ConversationId, outcome: &RequestOutcome) {
    if outcome.is_success() {
        debug!(conversation = %id, "turn completed");
    } else {
        info!(
            conversation = %id,
            outcome = outcome.kind.as_str(),
            "turn ended without success"
        );
    }
}

/// Provider text from an in-band error is logged, never surfaced.
fn stream_failure(id: &ConversationId, err: StreamError) -> RequestOutcome {
    warn!(conversation = %id, error = %err, "stream aborted");
    match err {
        StreamError::Decode(_) => RequestOutcome::of(OutcomeKind::ProtocolError),
        StreamError::Service(_) => RequestOutcome::of(OutcomeKind::TransportError),
    }
}

#[cfg(test)]
mod tests;
