use keyring::Entry;
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use super::CredentialSource;

pub const KEYRING_SERVICE: &str = "sehat";
pub const KEYRING_ACCOUNT: &str = "bearer-token";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain is locked).
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

#[derive(Clone, Debug)]
enum CachedLookup {
    Present(String),
    Missing,
}

/// Bearer token kept in the platform keyring.
///
/// Successful lookups are cached for the life of the value; errors are not,
/// so a locked keychain is retried on the next request.
pub struct KeyringToken {
    service: String,
    account: String,
    cache: Mutex<Option<CachedLookup>>,
}

impl Default for KeyringToken {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl KeyringToken {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            cache: Mutex::new(None),
        }
    }

    fn entry(&self) -> Result<Entry, KeyringAccessError> {
        Ok(Entry::new(&self.service, &self.account)?)
    }

    fn remember(&self, lookup: Option<CachedLookup>) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = lookup;
    }

    pub fn load(&self) -> Result<Option<String>, KeyringAccessError> {
        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Ok(match cached {
                CachedLookup::Present(token) => Some(token),
                CachedLookup::Missing => None,
            });
        }

        match self.entry()?.get_password() {
            Ok(token) => {
                debug!(service = %self.service, "keyring token found");
                self.remember(Some(CachedLookup::Present(token.clone())));
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => {
                self.remember(Some(CachedLookup::Missing));
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn store(&self, token: &str) -> Result<(), KeyringAccessError> {
        self.entry()?.set_password(token)?;
        self.remember(Some(CachedLookup::Present(token.to_string())));
        Ok(())
    }

    /// Removes the stored token. Returns false if there was none.
    pub fn delete(&self) -> Result<bool, KeyringAccessError> {
        let removed = match self.entry()?.delete_credential() {
            Ok(()) => true,
            Err(keyring::Error::NoEntry) => false,
            Err(err) => return Err(err.into()),
        };
        self.remember(Some(CachedLookup::Missing));
        Ok(removed)
    }
}

impl CredentialSource for KeyringToken {
    fn bearer_token(&self) -> Option<String> {
        match self.load() {
            Ok(token) => token,
            Err(err) => {
                warn!(
                    error = %err,
                    recoverable = err.is_recoverable(),
                    "keyring lookup failed, sending request without credentials"
                );
                None
            }
        }
    }
}
