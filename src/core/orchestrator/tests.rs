use super::*;
use crate::auth::{Anonymous, StaticToken};
use crate::core::constants::{ATTACHMENT_ONLY_TITLE, IMAGE_FALLBACK_PROMPT};
use crate::core::message::Role;
use crate::core::outcome::{
    MSG_BUSY, MSG_PROTOCOL, MSG_QUOTA_EXHAUSTED, MSG_RATE_LIMITED, MSG_TRANSPORT,
    MSG_UNAUTHORIZED,
};
use crate::core::store::TranscriptUpdate;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Clone)]
struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Value,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

struct StubResponse {
    status: u16,
    extra_headers: Vec<String>,
    chunks: Vec<Vec<u8>>,
    hold_open: Option<oneshot::Receiver<()>>,
}

impl StubResponse {
    fn stream(chunks: &[&str]) -> Self {
        Self {
            status: 200,
            extra_headers: vec!["Content-Type: text/event-stream".to_string()],
            chunks: chunks.iter().map(|chunk| chunk.as_bytes().to_vec()).collect(),
            hold_open: None,
        }
    }

    fn error(status: u16, body: &str) -> Self {
        Self {
            status,
            extra_headers: vec![
                "Content-Type: application/json".to_string(),
                format!("Content-Length: {}", body.len()),
            ],
            chunks: vec![body.as_bytes().to_vec()],
            hold_open: None,
        }
    }

    fn json(body: &str) -> Self {
        Self::error(200, body)
    }

    fn empty_success() -> Self {
        Self {
            status: 200,
            extra_headers: vec!["Content-Length: 0".to_string()],
            chunks: Vec::new(),
            hold_open: None,
        }
    }

    fn held_until(mut self, release: oneshot::Receiver<()>) -> Self {
        self.hold_open = Some(release);
        self
    }
}

async fn read_http_request(
    stream: &mut TcpStream,
) -> Result<(String, Vec<(String, String)>, Vec<u8>), String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok((request_line, headers, body))
}

/// Serves `responses` in order, one per connection, and records each request.
async fn spawn_stub(responses: Vec<StubResponse>) -> (String, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Ok((request_line, headers, body)) = read_http_request(&mut stream).await else {
                return;
            };
            let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
            captured_for_server.lock().await.push(CapturedRequest {
                request_line,
                headers,
                body,
            });

            let mut head = format!("HTTP/1.1 {} Stub\r\nConnection: close\r\n", response.status);
            for header in &response.extra_headers {
                head.push_str(header);
                head.push_str("\r\n");
            }
            head.push_str("\r\n");
            if stream.write_all(head.as_bytes()).await.is_err() {
                continue;
            }
            for chunk in &response.chunks {
                if stream.write_all(chunk).await.is_err() {
                    break;
                }
                let _ = stream.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            if let Some(release) = response.hold_open {
                let _ = release.await;
            }
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}/functions/v1/chat"), captured)
}

fn client_for(endpoint: String) -> ChatClient {
    ChatClient::new(
        ClientSettings::new(endpoint),
        Arc::new(StaticToken::new("test-token")),
        ConversationStore::new(),
    )
}

fn conversation_of(report: &SendReport) -> ConversationId {
    report
        .conversation_id
        .clone()
        .expect("report should name a conversation")
}

fn delta_event(fragment: &str) -> String {
    let event = serde_json::json!({ "choices": [{ "delta": { "content": fragment } }] });
    format!("data: {event}\n\n")
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn streams_reply_into_new_conversation() {
    let first = delta_event("नमस्ते");
    let second = delta_event(", कैसे मदद करूं?");
    let (endpoint, captured) = spawn_stub(vec![StubResponse::stream(&[
        first.as_str(),
        second.as_str(),
        "data: [DONE]\n\n",
    ])])
    .await;
    let client = client_for(endpoint);
    let mut updates = client.store().subscribe();

    let report = client
        .send_turn(None, "नमस्ते", Vec::new(), CancellationToken::new())
        .await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    let conversation = client
        .store()
        .snapshot(&conversation_of(&report))
        .expect("conversation exists");
    assert_eq!(conversation.title, "नमस्ते");
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[0].role, Role::User);
    assert_eq!(conversation.turns[0].content, "नमस्ते");
    assert_eq!(conversation.turns[1].role, Role::Assistant);
    assert_eq!(conversation.turns[1].content, "नमस्ते, कैसे मदद करूं?");
    assert!(!client.store().is_in_flight(&conversation_of(&report)));

    let requests = captured.lock().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.request_line.starts_with("POST /functions/v1/chat"));
    assert_eq!(request.header("authorization"), Some("Bearer test-token"));
    assert_eq!(request.header("accept"), Some("text/event-stream"));
    assert_eq!(request.body["stream"], Value::Bool(true));
    assert_eq!(
        request.body["messages"],
        serde_json::json!([{ "role": "user", "content": "नमस्ते" }])
    );

    let mut fragments = Vec::new();
    while let Ok(update) = updates.try_recv() {
        match update {
            TranscriptUpdate::ConversationCreated { title, .. } => assert_eq!(title, "नमस्ते"),
            TranscriptUpdate::TurnAppended { turn, .. } => fragments.push(turn.content),
            TranscriptUpdate::DeltaApplied { fragment, .. } => fragments.push(fragment),
            TranscriptUpdate::ConversationRemoved { .. } => panic!("nothing was removed"),
        }
    }
    assert_eq!(fragments, vec!["नमस्ते", "नमस्ते", ", कैसे मदद करूं?"]);
}

#[tokio::test]
async fn follow_up_turn_sends_whole_history_with_system_prompt() {
    let first = delta_event("पहला जवाब");
    let second = delta_event("दूसरा जवाब");
    let (endpoint, captured) = spawn_stub(vec![
        StubResponse::stream(&[first.as_str(), "data: [DONE]\n\n"]),
        StubResponse::stream(&[second.as_str(), "data: [DONE]\n\n"]),
    ])
    .await;
    let mut settings = ClientSettings::new(endpoint);
    settings.model = Some("gpt-4o-mini".to_string());
    settings.system_prompt = Some("आप एक सहायक हैं।".to_string());
    let client = ChatClient::new(settings, Arc::new(Anonymous), ConversationStore::new());

    let first_report = client
        .send_turn(None, "पहला सवाल", Vec::new(), CancellationToken::new())
        .await;
    assert!(first_report.outcome.is_success());
    let second_report = client
        .send_turn(
            first_report.conversation_id.clone(),
            "दूसरा सवाल",
            Vec::new(),
            CancellationToken::new(),
        )
        .await;
    assert!(second_report.outcome.is_success());
    assert_eq!(second_report.conversation_id, first_report.conversation_id);

    let requests = captured.lock().await;
    assert_eq!(requests.len(), 2);
    assert!(requests[1].header("authorization").is_none());
    assert_eq!(requests[1].body["model"], "gpt-4o-mini");
    assert_eq!(
        requests[1].body["messages"],
        serde_json::json!([
            { "role": "system", "content": "आप एक सहायक हैं।" },
            { "role": "user", "content": "पहला सवाल" },
            { "role": "assistant", "content": "पहला जवाब" },
            { "role": "user", "content": "दूसरा सवाल" }
        ])
    );

    let conversation = client
        .store()
        .snapshot(&conversation_of(&first_report))
        .expect("conversation exists");
    let contents: Vec<&str> = conversation
        .turns
        .iter()
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["पहला सवाल", "पहला जवाब", "दूसरा सवाल", "दूसरा जवाब"]
    );
}

#[tokio::test]
async fn image_only_turn_uses_fallback_prompt_and_attachment_title() {
    let reply = delta_event("यह एक दवा का पर्चा है।");
    let (endpoint, captured) =
        spawn_stub(vec![StubResponse::stream(&[reply.as_str(), "data: [DONE]\n\n"])]).await;
    let client = client_for(endpoint);
    let image = Attachment {
        name: "prescription.png".to_string(),
        media_kind: MediaKind::Image,
        inline_data: Some("data:image/png;base64,AAAA".to_string()),
    };

    let report = client
        .send_turn(None, "", vec![image], CancellationToken::new())
        .await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    let conversation = client
        .store()
        .snapshot(&conversation_of(&report))
        .expect("conversation exists");
    assert_eq!(conversation.title, ATTACHMENT_ONLY_TITLE);
    assert_eq!(conversation.turns[0].content, "");
    assert_eq!(conversation.turns[0].attachments.len(), 1);

    let requests = captured.lock().await;
    assert_eq!(
        requests[0].body["messages"],
        serde_json::json!([{
            "role": "user",
            "content": [
                { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } },
                { "type": "text", "text": IMAGE_FALLBACK_PROMPT }
            ]
        }])
    );
}

#[tokio::test]
async fn maps_error_statuses_to_outcomes() {
    let cases = [
        (429, OutcomeKind::RateLimited, MSG_RATE_LIMITED),
        (402, OutcomeKind::QuotaExhausted, MSG_QUOTA_EXHAUSTED),
        (401, OutcomeKind::Unauthorized, MSG_UNAUTHORIZED),
        (500, OutcomeKind::TransportError, MSG_TRANSPORT),
    ];

    for (status, kind, message) in cases {
        let (endpoint, _captured) = spawn_stub(vec![StubResponse::error(status, "{}")]).await;
        let client = client_for(endpoint);
        let report = client
            .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
            .await;

        assert_eq!(report.outcome.kind, kind, "status {status}");
        assert_eq!(report.outcome.message, message, "status {status}");

        let conversation = client
            .store()
            .snapshot(&conversation_of(&report))
            .expect("conversation exists");
        assert_eq!(conversation.turns.len(), 1, "user turn stays on {status}");
        assert!(!client.store().is_in_flight(&conversation_of(&report)));
    }
}

#[tokio::test]
async fn uses_service_error_message_from_body() {
    let body = r#"{"error":{"message":"Model overloaded"}}"#;
    let (endpoint, _captured) = spawn_stub(vec![StubResponse::error(503, body)]).await;
    let client = client_for(endpoint);

    let report = client
        .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::TransportError);
    assert_eq!(report.outcome.message, "Model overloaded");
}

#[tokio::test]
async fn empty_success_body_is_a_transport_error() {
    let (endpoint, _captured) = spawn_stub(vec![StubResponse::empty_success()]).await;
    let client = client_for(endpoint);

    let report = client
        .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::TransportError);
    assert_eq!(report.outcome.message, MSG_NO_BODY);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    drop(listener);
    let client = client_for(format!("http://{addr}/chat"));

    let report = client
        .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::TransportError);
    assert_eq!(report.outcome.message, MSG_TRANSPORT);
}

#[tokio::test]
async fn in_band_error_keeps_partial_reply() {
    let partial = delta_event("आधा");
    let (endpoint, _captured) = spawn_stub(vec![StubResponse::stream(&[
        partial.as_str(),
        "data: {\"error\":{\"message\":\"Provider returned error: upstream 502 Bad Gateway\"}}\n\n",
    ])])
    .await;
    let client = client_for(endpoint);

    let report = client
        .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::TransportError);
    assert_eq!(report.outcome.message, MSG_TRANSPORT);
    assert!(!report.outcome.message.contains("upstream"));
    let conversation = client
        .store()
        .snapshot(&conversation_of(&report))
        .expect("conversation exists");
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[1].content, "आधा");
}

#[tokio::test]
async fn stream_closing_mid_payload_is_a_protocol_error() {
    let partial = delta_event("शुरू");
    let (endpoint, _captured) = spawn_stub(vec![StubResponse::stream(&[
        partial.as_str(),
        "data: {\"choices\":[{\"delta\":{\"content\":\"अधू\n",
    ])])
    .await;
    let client = client_for(endpoint);

    let report = client
        .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::ProtocolError);
    let conversation = client
        .store()
        .snapshot(&conversation_of(&report))
        .expect("conversation exists");
    assert_eq!(conversation.turns[1].content, "शुरू");
}

#[tokio::test]
async fn stream_without_sentinel_still_succeeds() {
    let reply = delta_event("पूरा जवाब");
    let (endpoint, _captured) = spawn_stub(vec![StubResponse::stream(&[reply.as_str()])]).await;
    let client = client_for(endpoint);

    let report = client
        .send_turn(None, "सवाल", Vec::new(), CancellationToken::new())
        .await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    let conversation = client
        .store()
        .snapshot(&conversation_of(&report))
        .expect("conversation exists");
    assert_eq!(conversation.turns[1].content, "पूरा जवाब");
}

#[tokio::test]
async fn concurrent_send_is_busy_and_cancel_keeps_partial_reply() {
    let partial = delta_event("धीरे");
    let (release_tx, release_rx) = oneshot::channel();
    let follow_up = delta_event("अब ठीक");
    let (endpoint, captured) = spawn_stub(vec![
        StubResponse::stream(&[partial.as_str()]).held_until(release_rx),
        StubResponse::stream(&[follow_up.as_str(), "data: [DONE]\n\n"]),
    ])
    .await;
    let client = Arc::new(client_for(endpoint));
    let id = client.store().create("धीमा सवाल");
    let cancel = CancellationToken::new();

    let first = {
        let client = Arc::clone(&client);
        let id = id.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            client
                .send_turn(Some(id), "धीमा सवाल", Vec::new(), cancel)
                .await
        })
    };

    let store = client.store().clone();
    let watched = id.clone();
    wait_for(move || {
        store
            .snapshot(&watched)
            .is_some_and(|conversation| conversation.turns.len() == 2)
    })
    .await;

    let busy = client
        .send_turn(Some(id.clone()), "दूसरा", Vec::new(), CancellationToken::new())
        .await;
    assert_eq!(busy.outcome.kind, OutcomeKind::Busy);
    assert_eq!(busy.outcome.message, MSG_BUSY);

    cancel.cancel();
    let first = first.await.expect("send task should finish");
    assert_eq!(first.outcome.kind, OutcomeKind::Cancelled);
    let _ = release_tx.send(());

    let conversation = client.store().snapshot(&id).expect("conversation exists");
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[1].content, "धीरे");
    assert!(!client.store().is_in_flight(&id));

    let retry = client
        .send_turn(Some(id.clone()), "फिर से", Vec::new(), CancellationToken::new())
        .await;
    assert!(retry.outcome.is_success(), "{:?}", retry.outcome);
    assert_eq!(captured.lock().await.len(), 2);
}

#[tokio::test]
async fn oversized_turn_stays_visible_without_a_request() {
    let (endpoint, captured) = spawn_stub(Vec::new()).await;
    let client = client_for(endpoint);
    let id = client.store().create("लंबा");
    let long_text = "अ".repeat(crate::api::MAX_CONTENT_CHARS + 1);

    let report = client
        .send_turn(Some(id.clone()), &long_text, Vec::new(), CancellationToken::new())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::InvalidRequest);
    assert_eq!(report.conversation_id.as_ref(), Some(&id));
    let conversation = client.store().snapshot(&id).expect("conversation exists");
    assert_eq!(conversation.turns.len(), 1);
    assert_eq!(conversation.turns[0].role, Role::User);
    assert_eq!(conversation.turns[0].content, long_text);
    assert!(!client.store().is_in_flight(&id));

    let fresh = client
        .send_turn(None, &long_text, Vec::new(), CancellationToken::new())
        .await;
    assert_eq!(fresh.outcome.kind, OutcomeKind::InvalidRequest);
    let fresh_id = conversation_of(&fresh);
    let conversation = client
        .store()
        .snapshot(&fresh_id)
        .expect("fresh conversation is stored");
    assert_eq!(conversation.turns.len(), 1);
    assert_eq!(conversation.turns[0].content, long_text);
    assert_eq!(client.store().list().len(), 2);
    assert!(captured.lock().await.is_empty());
}

#[tokio::test]
async fn unknown_conversation_and_empty_input_are_invalid() {
    let (endpoint, captured) = spawn_stub(Vec::new()).await;
    let client = client_for(endpoint);

    let unknown = client
        .send_turn(
            Some(ConversationId::from("missing")),
            "सवाल",
            Vec::new(),
            CancellationToken::new(),
        )
        .await;
    assert_eq!(unknown.outcome.kind, OutcomeKind::InvalidRequest);
    assert_eq!(unknown.outcome.message, MSG_CONVERSATION_NOT_FOUND);

    let empty = client
        .send_turn(None, "   ", Vec::new(), CancellationToken::new())
        .await;
    assert_eq!(empty.outcome.kind, OutcomeKind::InvalidRequest);
    assert_eq!(empty.outcome.message, MSG_EMPTY_INPUT);
    assert_eq!(empty.conversation_id, None);
    assert!(client.store().list().is_empty());

    let existing = client.store().create("पुरानी बातचीत");
    let empty_follow_up = client
        .send_turn(Some(existing.clone()), "", Vec::new(), CancellationToken::new())
        .await;
    assert_eq!(empty_follow_up.outcome.kind, OutcomeKind::InvalidRequest);
    assert_eq!(empty_follow_up.conversation_id, Some(existing));
    assert!(captured.lock().await.is_empty());
}

#[tokio::test]
async fn cancel_interrupts_reading_an_error_body() {
    let (release_tx, release_rx) = oneshot::channel();
    let stalled = StubResponse {
        status: 502,
        extra_headers: vec![
            "Content-Type: application/json".to_string(),
            "Content-Length: 4096".to_string(),
        ],
        chunks: vec![b"{\"error\":".to_vec()],
        hold_open: Some(release_rx),
    };
    let (endpoint, captured) = spawn_stub(vec![stalled]).await;
    let client = Arc::new(client_for(endpoint));
    let cancel = CancellationToken::new();

    let pending = {
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        tokio::spawn(async move { client.send_turn(None, "सवाल", Vec::new(), cancel).await })
    };

    wait_for(|| captured.try_lock().is_ok_and(|requests| requests.len() == 1)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("cancel should end the request while the body stalls")
        .expect("send task should finish");
    assert_eq!(report.outcome.kind, OutcomeKind::Cancelled);
    assert!(!client.store().is_in_flight(&conversation_of(&report)));
    let _ = release_tx.send(());
}

fn image_client(endpoint: String) -> ChatClient {
    let mut settings = ClientSettings::new(endpoint);
    settings.image_model = Some("google/gemini-2.5-flash-image".to_string());
    ChatClient::new(
        settings,
        Arc::new(StaticToken::new("test-token")),
        ConversationStore::new(),
    )
}

#[tokio::test]
async fn generates_image_into_assistant_turn() {
    let body = serde_json::json!({"choices":[{"message":{
        "role": "assistant",
        "content": "",
        "images": [{"type":"image_url","image_url":{"url":"data:image/png;base64,iVBOR"}}]
    }}]})
    .to_string();
    let (endpoint, captured) = spawn_stub(vec![StubResponse::json(&body)]).await;
    let client = image_client(endpoint);

    let report = client
        .generate_image(None, "  सुंदर पहाड़  ", CancellationToken::new())
        .await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    let id = conversation_of(&report);
    let conversation = client.store().snapshot(&id).expect("conversation exists");
    assert_eq!(conversation.title, "सुंदर पहाड़");
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[0].role, Role::User);
    assert_eq!(conversation.turns[0].content, "सुंदर पहाड़");
    let reply = &conversation.turns[1];
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, IMAGE_READY_MESSAGE);
    assert_eq!(
        reply.attachments,
        vec![Attachment {
            name: GENERATED_IMAGE_NAME.to_string(),
            media_kind: MediaKind::Image,
            inline_data: Some("data:image/png;base64,iVBOR".to_string()),
        }]
    );
    assert!(!client.store().is_in_flight(&id));

    let requests = captured.lock().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.header("authorization"), Some("Bearer test-token"));
    assert_eq!(request.header("accept"), Some("application/json"));
    assert_eq!(
        request.body,
        serde_json::json!({
            "model": "google/gemini-2.5-flash-image",
            "messages": [{ "role": "user", "content": "Generate an image: सुंदर पहाड़" }],
            "modalities": ["image", "text"],
            "stream": false
        })
    );
}

#[tokio::test]
async fn reads_image_from_each_response_shape() {
    let cases = [
        (
            serde_json::json!({"choices":[{"message":{"content":[
                {"type":"text","text":"ok"},
                {"type":"image_url","image_url":{"url":"https://cdn.example/a.png"}}
            ]}}]}),
            "https://cdn.example/a.png",
        ),
        (
            serde_json::json!({"choices":[{"message":{"content":[
                {"type":"image","url":"https://cdn.example/b.png"}
            ]}}]}),
            "https://cdn.example/b.png",
        ),
        (
            serde_json::json!({"choices":[{"message":{"content":[
                {"inline_data":{"mime_type":"image/jpeg","data":"/9j/4AAQ"}}
            ]}}]}),
            "data:image/jpeg;base64,/9j/4AAQ",
        ),
    ];

    for (body, expected) in cases {
        let (endpoint, _captured) = spawn_stub(vec![StubResponse::json(&body.to_string())]).await;
        let client = image_client(endpoint);

        let report = client
            .generate_image(None, "एक बिल्ली", CancellationToken::new())
            .await;

        assert!(report.outcome.is_success(), "{body}: {:?}", report.outcome);
        let conversation = client
            .store()
            .snapshot(&conversation_of(&report))
            .expect("conversation exists");
        assert_eq!(
            conversation.turns[1].attachments[0].inline_image(),
            Some(expected)
        );
    }
}

#[tokio::test]
async fn image_caption_and_follow_up_history() {
    let body = serde_json::json!({"choices":[{"message":{
        "content": "यह रहा आपका सूर्यास्त",
        "images": [{"image_url":{"url":"https://cdn.example/sunset.png"}}]
    }}]})
    .to_string();
    let follow_up = delta_event("सुंदर है");
    let (endpoint, captured) = spawn_stub(vec![
        StubResponse::json(&body),
        StubResponse::stream(&[follow_up.as_str(), "data: [DONE]\n\n"]),
    ])
    .await;
    let client = image_client(endpoint);

    let image = client
        .generate_image(None, "सूर्यास्त", CancellationToken::new())
        .await;
    assert!(image.outcome.is_success(), "{:?}", image.outcome);
    let chat = client
        .send_turn(
            image.conversation_id.clone(),
            "कैसा लगा?",
            Vec::new(),
            CancellationToken::new(),
        )
        .await;
    assert!(chat.outcome.is_success(), "{:?}", chat.outcome);

    let requests = captured.lock().await;
    assert_eq!(
        requests[1].body["messages"],
        serde_json::json!([
            { "role": "user", "content": "सूर्यास्त" },
            { "role": "assistant", "content": "यह रहा आपका सूर्यास्त" },
            { "role": "user", "content": "कैसा लगा?" }
        ])
    );
}

#[tokio::test]
async fn image_failures_keep_the_prompt_turn() {
    let text_only = serde_json::json!({"choices":[{"message":{"content":"मैं चित्र नहीं बना सकता"}}]})
        .to_string();
    let cases = [
        (
            StubResponse::json(&text_only),
            OutcomeKind::ProtocolError,
            MSG_IMAGE_MISSING,
        ),
        (
            StubResponse::json("<html>gateway</html>"),
            OutcomeKind::ProtocolError,
            MSG_PROTOCOL,
        ),
        (
            StubResponse::error(429, "{}"),
            OutcomeKind::RateLimited,
            MSG_RATE_LIMITED,
        ),
        (
            StubResponse::error(402, "{}"),
            OutcomeKind::QuotaExhausted,
            MSG_QUOTA_EXHAUSTED,
        ),
        (
            StubResponse::error(500, "{}"),
            OutcomeKind::TransportError,
            MSG_IMAGE_FAILED,
        ),
    ];

    for (response, kind, message) in cases {
        let (endpoint, _captured) = spawn_stub(vec![response]).await;
        let client = image_client(endpoint);

        let report = client
            .generate_image(None, "एक नदी", CancellationToken::new())
            .await;

        assert_eq!(report.outcome.kind, kind, "{message}");
        assert_eq!(report.outcome.message, message);
        let id = conversation_of(&report);
        let conversation = client.store().snapshot(&id).expect("conversation exists");
        assert_eq!(conversation.turns.len(), 1);
        assert_eq!(conversation.turns[0].content, "एक नदी");
        assert!(!client.store().is_in_flight(&id));
    }
}

#[tokio::test]
async fn image_requests_respect_prompt_and_busy_rules() {
    let (endpoint, captured) = spawn_stub(Vec::new()).await;
    let client = image_client(endpoint);

    let empty = client
        .generate_image(None, "   ", CancellationToken::new())
        .await;
    assert_eq!(empty.outcome.kind, OutcomeKind::InvalidRequest);
    assert_eq!(empty.outcome.message, MSG_IMAGE_PROMPT_REQUIRED);
    assert_eq!(empty.conversation_id, None);
    assert!(client.store().list().is_empty());

    let id = client.store().create("व्यस्त");
    let _guard = client.store().begin_request(&id).expect("idle conversation");
    let busy = client
        .generate_image(Some(id.clone()), "एक पेड़", CancellationToken::new())
        .await;
    assert_eq!(busy.outcome.kind, OutcomeKind::Busy);
    let conversation = client.store().snapshot(&id).expect("conversation exists");
    assert!(conversation.turns.is_empty());

    let unknown = client
        .generate_image(
            Some(ConversationId::from("missing")),
            "एक पेड़",
            CancellationToken::new(),
        )
        .await;
    assert_eq!(unknown.outcome.message, MSG_CONVERSATION_NOT_FOUND);
    assert!(captured.lock().await.is_empty());
}
