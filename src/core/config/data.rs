use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::constants::{DEFAULT_ENDPOINT, DEFAULT_IMAGE_MODEL, DEFAULT_MODEL};

pub const ENDPOINT_ENV: &str = "SEHAT_ENDPOINT";
pub const MODEL_ENV: &str = "SEHAT_MODEL";
pub const IMAGE_MODEL_ENV: &str = "SEHAT_IMAGE_MODEL";
pub const DEFAULT_TOKEN_ENV: &str = "SEHAT_API_KEY";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Full URL of the streaming chat completion endpoint.
    pub endpoint: Option<String>,
    /// Model name sent with each chat request (default `gpt-4o-mini`).
    pub model: Option<String>,
    /// Model used for image generation (default
    /// `google/gemini-2.5-flash-image`).
    pub image_model: Option<String>,
    /// System instructions prepended to every request.
    pub system_prompt: Option<String>,
    /// Environment variable holding a bearer token (default `SEHAT_API_KEY`).
    pub token_env: Option<String>,
}

/// Keys accepted by `sehat set` / `sehat unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Endpoint,
    Model,
    ImageModel,
    SystemPrompt,
    TokenEnv,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::Endpoint,
        ConfigKey::Model,
        ConfigKey::ImageModel,
        ConfigKey::SystemPrompt,
        ConfigKey::TokenEnv,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Endpoint => "endpoint",
            ConfigKey::Model => "model",
            ConfigKey::ImageModel => "image-model",
            ConfigKey::SystemPrompt => "system-prompt",
            ConfigKey::TokenEnv => "token-env",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| {
                let known: Vec<&str> = ConfigKey::ALL.iter().map(|key| key.as_str()).collect();
                format!("Unknown config key: {value} (expected one of {})", known.join(", "))
            })
    }
}

impl Config {
    fn slot(&mut self, key: ConfigKey) -> &mut Option<String> {
        match key {
            ConfigKey::Endpoint => &mut self.endpoint,
            ConfigKey::Model => &mut self.model,
            ConfigKey::ImageModel => &mut self.image_model,
            ConfigKey::SystemPrompt => &mut self.system_prompt,
            ConfigKey::TokenEnv => &mut self.token_env,
        }
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        match key {
            ConfigKey::Endpoint => self.endpoint.as_deref(),
            ConfigKey::Model => self.model.as_deref(),
            ConfigKey::ImageModel => self.image_model.as_deref(),
            ConfigKey::SystemPrompt => self.system_prompt.as_deref(),
            ConfigKey::TokenEnv => self.token_env.as_deref(),
        }
    }

    pub fn set(&mut self, key: ConfigKey, value: impl Into<String>) {
        let value = value.into();
        *self.slot(key) = Some(value.trim().to_string()).filter(|v| !v.is_empty());
    }

    pub fn unset(&mut self, key: ConfigKey) {
        *self.slot(key) = None;
    }

    /// Endpoint after applying the `SEHAT_ENDPOINT` override.
    pub fn resolved_endpoint(&self) -> String {
        env::var(ENDPOINT_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// Model after applying the `SEHAT_MODEL` override.
    pub fn resolved_model(&self) -> String {
        env_override(MODEL_ENV)
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Image model after applying the `SEHAT_IMAGE_MODEL` override.
    pub fn resolved_image_model(&self) -> String {
        env_override(IMAGE_MODEL_ENV)
            .or_else(|| self.image_model.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string())
    }

    pub fn token_env_var(&self) -> &str {
        self.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
    }
}

fn env_override(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
