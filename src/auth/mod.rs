//! Credentials attached to outgoing requests.
//!
//! Anonymous access is legal: when no source yields a token the request is
//! sent without an `Authorization` header, and a server that requires one
//! answers with 401, which surfaces as an unauthorized outcome.

pub mod keychain;

use std::env;

pub use self::keychain::{KeyringAccessError, KeyringToken};

/// Supplies an optional bearer token for each request.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// No credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CredentialSource for Anonymous {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Token read from an environment variable at request time.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvToken {
    fn bearer_token(&self) -> Option<String> {
        env::var(&self.var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Tries each source in order and uses the first token found.
#[derive(Default)]
pub struct ChainedCredentials {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl CredentialSource for ChainedCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.sources.iter().find_map(|source| source.bearer_token())
    }
}

/// Adds the `Authorization: Bearer` header when a token is available.
pub fn add_auth_header(
    request: reqwest::RequestBuilder,
    credentials: &dyn CredentialSource,
) -> reqwest::RequestBuilder {
    match credentials.bearer_token() {
        Some(token) => request.header("Authorization", format!("Bearer {token}")),
        None => request,
    }
}
