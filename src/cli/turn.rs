//! Runs one turn in the foreground, echoing the reply as it streams.

use std::io::{self, Write};

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::conversation::ConversationId;
use crate::core::message::Attachment;
use crate::core::orchestrator::{ChatClient, SendReport};
use crate::core::outcome::OutcomeKind;
use crate::core::store::TranscriptUpdate;

/// What the user asked for in one foreground turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    Message {
        text: String,
        attachments: Vec<Attachment>,
    },
    Image {
        prompt: String,
    },
}

/// Returns the assistant text carried by an update, if any.
pub fn assistant_text(update: &TranscriptUpdate) -> Option<&str> {
    match update {
        TranscriptUpdate::TurnAppended { turn, .. } if turn.is_assistant() => {
            Some(turn.content.as_str())
        }
        TranscriptUpdate::DeltaApplied { fragment, .. } => Some(fragment.as_str()),
        _ => None,
    }
}

/// One-line description of a generated image. `data:` URLs are summarized
/// rather than dumped to the terminal.
pub fn describe_image(attachment: &Attachment) -> Option<String> {
    let url = attachment.inline_image()?;
    if url.starts_with("data:") {
        Some(format!("🖼  {} ({} bytes inline)", attachment.name, url.len()))
    } else {
        Some(format!("🖼  {url}"))
    }
}

fn echo(out: &mut impl Write, update: &TranscriptUpdate) -> io::Result<()> {
    if let Some(text) = assistant_text(update) {
        out.write_all(text.as_bytes())?;
    }
    if let TranscriptUpdate::TurnAppended { turn, .. } = update {
        if turn.is_assistant() {
            for line in turn.attachments.iter().filter_map(describe_image) {
                writeln!(out)?;
                out.write_all(line.as_bytes())?;
            }
        }
    }
    out.flush()
}

/// Runs a turn and prints assistant output to stdout until the request ends.
/// Ctrl+C while waiting stops the request; a partial answer is kept.
pub async fn run_turn(
    client: &ChatClient,
    conversation_id: Option<ConversationId>,
    input: TurnInput,
) -> io::Result<SendReport> {
    let mut updates = client.store().subscribe();
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut stdout = io::stdout();
    let send = async {
        match input {
            TurnInput::Message { text, attachments } => {
                client
                    .send_turn(conversation_id, &text, attachments, cancel)
                    .await
            }
            TurnInput::Image { prompt } => {
                client.generate_image(conversation_id, &prompt, cancel).await
            }
        }
    };
    tokio::pin!(send);

    let report = loop {
        tokio::select! {
            report = &mut send => break report,
            update = updates.recv() => match update {
                Ok(update) => echo(&mut stdout, &update)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "display fell behind the transcript");
                }
                Err(RecvError::Closed) => break (&mut send).await,
            },
        }
    };
    interrupt.abort();

    while let Ok(update) = updates.try_recv() {
        echo(&mut stdout, &update)?;
    }
    println!();

    print_outcome(&report);
    Ok(report)
}

fn print_outcome(report: &SendReport) {
    match report.outcome.kind {
        OutcomeKind::Success => {}
        OutcomeKind::Cancelled => eprintln!("⏹ {}", report.outcome.message),
        _ => eprintln!("❌ {}", report.outcome.message),
    }
}
