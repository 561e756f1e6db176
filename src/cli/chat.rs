//! Line-oriented interactive chat.

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::turn::{run_turn, TurnInput};
use crate::core::conversation::ConversationId;
use crate::core::message::Attachment;
use crate::core::orchestrator::ChatClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    New,
    Attach(String),
    Image(String),
    List,
    Switch(usize),
    Delete(usize),
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Send(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "new" => ReplCommand::New,
        "list" => ReplCommand::List,
        "quit" | "exit" => ReplCommand::Quit,
        "attach" if rest.is_empty() => ReplCommand::Invalid("Usage: /attach <path>".to_string()),
        "attach" => ReplCommand::Attach(rest.to_string()),
        "image" if rest.is_empty() => ReplCommand::Invalid("Usage: /image <prompt>".to_string()),
        "image" => ReplCommand::Image(rest.to_string()),
        "switch" => match parse_index(rest) {
            Some(index) => ReplCommand::Switch(index),
            None => ReplCommand::Invalid("Usage: /switch <n> (see /list)".to_string()),
        },
        "delete" => match parse_index(rest) {
            Some(index) => ReplCommand::Delete(index),
            None => ReplCommand::Invalid("Usage: /delete <n> (see /list)".to_string()),
        },
        _ => ReplCommand::Invalid(format!("Unknown command: /{name}")),
    }
}

fn parse_index(text: &str) -> Option<usize> {
    text.parse::<usize>().ok().filter(|index| *index > 0)
}

struct ChatSession {
    client: ChatClient,
    current: Option<ConversationId>,
    pending: Vec<Attachment>,
}

impl ChatSession {
    fn list(&self) {
        let conversations = self.client.store().list();
        if conversations.is_empty() {
            println!("No conversations yet.");
            return;
        }
        for (index, summary) in conversations.iter().enumerate() {
            let marker = if self.current.as_ref() == Some(&summary.id) {
                "*"
            } else {
                " "
            };
            println!(
                "{marker} {}. {} ({} turns, {})",
                index + 1,
                summary.title,
                summary.turn_count,
                summary.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    fn switch(&mut self, index: usize) {
        match self.client.store().list().into_iter().nth(index - 1) {
            Some(summary) => {
                println!("Switched to: {}", summary.title);
                self.current = Some(summary.id);
            }
            None => println!("No conversation {index}. Use /list to see them."),
        }
    }

    fn delete(&mut self, index: usize) {
        let Some(summary) = self.client.store().list().into_iter().nth(index - 1) else {
            println!("No conversation {index}. Use /list to see them.");
            return;
        };
        self.client.store().remove(&summary.id);
        if self.current.as_ref() == Some(&summary.id) {
            self.current = None;
        }
        println!("Deleted: {}", summary.title);
    }

    fn attach(&mut self, path: &str) {
        match Attachment::from_path(Path::new(path)) {
            Ok(attachment) => {
                println!("📎 {} will be sent with your next message", attachment.name);
                self.pending.push(attachment);
            }
            Err(err) => eprintln!("❌ {err}"),
        }
    }

    async fn send(&mut self, text: String) -> io::Result<()> {
        let attachments = std::mem::take(&mut self.pending);
        self.run(TurnInput::Message { text, attachments }).await
    }

    async fn image(&mut self, prompt: String) -> io::Result<()> {
        if !self.pending.is_empty() {
            println!("📎 attachments stay queued for your next message");
        }
        self.run(TurnInput::Image { prompt }).await
    }

    async fn run(&mut self, input: TurnInput) -> io::Result<()> {
        let report = run_turn(&self.client, self.current.clone(), input).await?;
        if let Some(id) = report.conversation_id {
            self.current = Some(id);
        }
        Ok(())
    }
}

pub async fn run_chat(client: ChatClient) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession {
        client,
        current: None,
        pending: Vec::new(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type a message and press Enter. /quit to leave.");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_command(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::New => {
                session.current = None;
                println!("Started a new conversation.");
            }
            ReplCommand::Attach(path) => session.attach(&path),
            ReplCommand::List => session.list(),
            ReplCommand::Switch(index) => session.switch(index),
            ReplCommand::Delete(index) => session.delete(index),
            ReplCommand::Invalid(message) => eprintln!("{message}"),
            ReplCommand::Image(prompt) => session.image(prompt).await?,
            ReplCommand::Send(text) => session.send(text).await?,
        }
    }

    Ok(())
}
