//! `auth` and `deauth` commands.

use std::error::Error;
use std::io::{self, Write};

use crate::auth::KeyringToken;

fn prompt(message: &str) -> io::Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub fn run_auth() -> Result<(), Box<dyn Error>> {
    let token = prompt("Enter bearer token: ")?;
    if token.is_empty() {
        println!("Cancelled.");
        return Ok(());
    }

    if let Err(err) = KeyringToken::default().store(&token) {
        eprintln!("❌ Could not store token: {err}");
        if err.is_recoverable() {
            eprintln!("   Unlock your keyring or export the token in SEHAT_API_KEY instead.");
        }
        std::process::exit(1);
    }
    println!("✅ Token stored in the system keyring");
    Ok(())
}

pub fn run_deauth() -> Result<(), Box<dyn Error>> {
    let confirm = prompt("Remove the stored token? (y/N): ")?;
    if !matches!(confirm.to_lowercase().as_str(), "y" | "yes") {
        println!("Cancelled.");
        return Ok(());
    }

    match KeyringToken::default().delete()? {
        true => println!("✅ Token removed"),
        false => println!("No stored token found."),
    }
    Ok(())
}
