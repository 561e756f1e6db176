//! Diagnostic logging setup.
//!
//! Verbosity comes from `SEHAT_LOG` using `EnvFilter` directives
//! (`SEHAT_LOG=sehat=debug`), defaulting to warnings only.

use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SEHAT_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs the global subscriber, writing to stderr or appending to
/// `log_file` when one is given.
pub fn init(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|err| err as Box<dyn Error>)
}
