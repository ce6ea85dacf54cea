use crate::api::User;
use crate::core::client::{ApiError, ChatClient};
use crate::core::keyring::KeyringAccessError;
use keyring::Entry;
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

pub mod ui;

const KEYRING_SERVICE: &str = "flexgpt";
const KEYRING_USER: &str = "access_token";
pub const TOKEN_ENV: &str = "FLEXGPT_TOKEN";

#[derive(Debug)]
pub enum AuthError {
    NotLoggedIn,
    EmptyToken,
    Keyring(KeyringAccessError),
    Api(ApiError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NotLoggedIn => {
                write!(f, "Not logged in. Run `flexgpt login` or set {TOKEN_ENV}.")
            }
            AuthError::EmptyToken => write!(f, "Server returned an empty token"),
            AuthError::Keyring(err) => write!(f, "Could not access stored credentials: {err}"),
            AuthError::Api(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Keyring(err) => Some(err),
            AuthError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<KeyringAccessError> for AuthError {
    fn from(err: KeyringAccessError) -> Self {
        AuthError::Keyring(err)
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        AuthError::Api(err)
    }
}

enum TokenBackend {
    Keyring,
    Memory(Mutex<Option<String>>),
}

/// Where the access token lives between runs.
///
/// `FLEXGPT_TOKEN` wins over the stored token when set.
pub struct TokenStore {
    backend: TokenBackend,
    env_override: Option<String>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            backend: TokenBackend::Keyring,
            env_override: std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()),
        }
    }

    /// Token store that never touches the system keyring or environment.
    pub fn in_memory(initial: Option<String>) -> Self {
        Self {
            backend: TokenBackend::Memory(Mutex::new(initial)),
            env_override: None,
        }
    }

    pub fn load(&self) -> Result<Option<String>, KeyringAccessError> {
        if let Some(token) = &self.env_override {
            return Ok(Some(token.clone()));
        }

        match &self.backend {
            TokenBackend::Memory(slot) => Ok(lock_slot(slot).clone()),
            TokenBackend::Keyring => {
                let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
                match entry.get_password() {
                    Ok(token) => Ok(Some(token)),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    pub fn store(&self, token: &str) -> Result<(), KeyringAccessError> {
        match &self.backend {
            TokenBackend::Memory(slot) => {
                *lock_slot(slot) = Some(token.to_string());
                Ok(())
            }
            TokenBackend::Keyring => {
                let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
                entry.set_password(token)?;
                Ok(())
            }
        }
    }

    /// Remove the stored token. Missing entries are not an error.
    pub fn clear(&self) -> Result<(), KeyringAccessError> {
        match &self.backend {
            TokenBackend::Memory(slot) => {
                lock_slot(slot).take();
                Ok(())
            }
            TokenBackend::Keyring => {
                let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
                match entry.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    pub fn has_env_override(&self) -> bool {
        self.env_override.is_some()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_slot(slot: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Gate for commands that need a signed-in user.
pub fn require_token(store: &TokenStore) -> Result<String, AuthError> {
    store.load()?.ok_or(AuthError::NotLoggedIn)
}

pub struct AuthManager {
    client: ChatClient,
    tokens: TokenStore,
}

impl AuthManager {
    pub fn new(client: ChatClient, tokens: TokenStore) -> Self {
        Self { client, tokens }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.tokens.load(), Ok(Some(_)))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let response = self.client.login(email.trim(), password).await?;
        if response.token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        self.tokens.store(&response.token)?;
        debug!(user = %response.user.email, "stored access token");
        Ok(response.user)
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.tokens.clear()?;
        Ok(())
    }

    /// Client carrying the current token, for authenticated calls.
    pub fn authenticated_client(&self) -> Result<ChatClient, AuthError> {
        let token = require_token(&self.tokens)?;
        Ok(self.client.clone().with_token(Some(token)))
    }
}
