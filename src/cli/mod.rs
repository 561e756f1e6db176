//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod auth;
pub mod chat;
pub mod say;
pub mod settings;
pub mod turn;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::auth::{ChainedCredentials, EnvToken, KeyringToken};
use crate::core::config::Config;
use crate::core::orchestrator::{ChatClient, ClientSettings};
use crate::core::store::ConversationStore;
use crate::utils::logging;

#[derive(Parser)]
#[command(name = "sehat")]
#[command(about = "A streaming chat client for health questions")]
#[command(
    long_about = "Sehat sends your questions, with optional images, to a streaming chat \
completion endpoint and prints the answer as it arrives.\n\n\
Defaults:\n\
  The endpoint defaults to OpenAI's chat completions URL with the model\n\
  'gpt-4o-mini'; images use 'google/gemini-2.5-flash-image'. Point 'endpoint'\n\
  at another gateway with 'sehat set endpoint <url>' and pick its models with\n\
  'sehat set model <name>' and 'sehat set image-model <name>'.\n\n\
Authentication:\n\
  Use 'sehat auth' to store a bearer token in your system keyring, or export it in\n\
  SEHAT_API_KEY (see 'sehat set token-env').\n\n\
Environment Variables:\n\
  SEHAT_ENDPOINT    Chat completion URL (overrides the configured endpoint)\n\
  SEHAT_MODEL       Chat model (overrides the configured model)\n\
  SEHAT_IMAGE_MODEL Image model (overrides the configured image-model)\n\
  SEHAT_LOG         Log filter, e.g. 'debug' or 'sehat=trace' (default: warn)\n\n\
Chat commands:\n\
  /new              Start a new conversation\n\
  /attach <path>    Attach a file to the next message\n\
  /image <prompt>   Generate an image from a description\n\
  /list             List conversations\n\
  /switch <n>       Continue conversation n from /list\n\
  /delete <n>       Delete conversation n from /list\n\
  /quit             Leave the chat\n\
  Ctrl+C            Stop the answer being streamed"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Write diagnostic logs to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Chat completion URL to use for this run
    #[arg(short = 'e', long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Model to request for this run
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Ask a single question and print the answer
    Say {
        /// Question to ask
        #[arg(required = true)]
        prompt: Vec<String>,
        /// File to attach (repeatable)
        #[arg(short = 'a', long = "attach", value_name = "FILE")]
        attach: Vec<PathBuf>,
    },
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (can be multiple words)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Show the current configuration
    Config,
    /// Store a bearer token in the system keyring
    Auth,
    /// Remove the stored bearer token
    Deauth,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.log.as_deref())?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let client = build_client(args.endpoint, args.model)?;
            chat::run_chat(client).await
        }
        Commands::Say { prompt, attach } => {
            let client = build_client(args.endpoint, args.model)?;
            say::run_say(&client, prompt, attach).await
        }
        Commands::Set { key, value } => settings::run_set(&key, &value),
        Commands::Unset { key } => settings::run_unset(&key),
        Commands::Config => settings::run_config(),
        Commands::Auth => auth::run_auth(),
        Commands::Deauth => auth::run_deauth(),
    }
}

/// Resolves settings from the config file, environment and command-line
/// overrides, in increasing precedence.
fn build_client(
    endpoint: Option<String>,
    model: Option<String>,
) -> Result<ChatClient, Box<dyn Error>> {
    let config = Config::load()?;
    let mut settings = ClientSettings::from_config(&config);
    if let Some(endpoint) = endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(model) = model {
        settings.model = Some(model);
    }

    let credentials = ChainedCredentials::new()
        .with(EnvToken::new(config.token_env_var()))
        .with(KeyringToken::default());

    Ok(ChatClient::new(
        settings,
        Arc::new(credentials),
        ConversationStore::new(),
    ))
}
