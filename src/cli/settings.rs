//! `set`, `unset` and `config` commands.

use std::error::Error;
use std::path::Path;

use crate::core::config::data::path_display;
use crate::core::config::{Config, ConfigKey};

fn parse_key(key: &str) -> Result<ConfigKey, Box<dyn Error>> {
    key.parse::<ConfigKey>().map_err(Into::into)
}

/// Applies `key = value` to `config`, returning the stored value.
pub fn apply_set(config: &mut Config, key: ConfigKey, value: &[String]) -> Option<String> {
    config.set(key, value.join(" "));
    config.get(key).map(str::to_string)
}

pub fn run_set(key: &str, value: &[String]) -> Result<(), Box<dyn Error>> {
    let key = parse_key(key)?;
    let mut config = Config::load()?;
    match apply_set(&mut config, key, value) {
        Some(stored) => {
            let path = config.save()?;
            println!("✅ Set {} to: {stored}", key.as_str());
            print_saved(&path);
        }
        None => {
            eprintln!("❌ Empty value for {}; use 'sehat unset {}' instead", key.as_str(), key.as_str());
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn run_unset(key: &str) -> Result<(), Box<dyn Error>> {
    let key = parse_key(key)?;
    let mut config = Config::load()?;
    config.unset(key);
    let path = config.save()?;
    println!("✅ Unset {}", key.as_str());
    print_saved(&path);
    Ok(())
}

pub fn run_config() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    config.print_all();
    if let Ok(path) = Config::get_config_path() {
        println!("  file: {}", path_display(path));
    }
    Ok(())
}

fn print_saved(path: &Path) {
    println!("   (saved to {})", path_display(path));
}
