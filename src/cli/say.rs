//! Non-interactive "say" command

use std::error::Error;
use std::path::PathBuf;

use crate::cli::turn::{run_turn, TurnInput};
use crate::core::message::Attachment;
use crate::core::orchestrator::ChatClient;

pub async fn run_say(
    client: &ChatClient,
    prompt: Vec<String>,
    attach: Vec<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    let attachments = attach
        .iter()
        .map(|path| Attachment::from_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    let input = TurnInput::Message {
        text: prompt,
        attachments,
    };
    let report = run_turn(client, None, input).await?;
    if !report.outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
