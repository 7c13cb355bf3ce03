//! Maps credentials to an identity. Sessions only ever see the
//! resulting `Identity`, never the credentials themselves.
pub mod db;
pub use db::SqliteAccounts;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::chat::Identity;

#[derive(Clone, Deserialize)]
pub struct Credential {
    pub handle: String,
    pub password: String,
}

impl Credential {
    pub fn new(handle: &str, password: &str) -> Self {
        Self {
            handle: handle.to_string(),
            password: password.to_string(),
        }
    }
}

// Keep passwords out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("handle", &self.handle)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("credential store unavailable: {0}")]
    Storage(String),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credential: &Credential) -> Result<Identity, AuthError>;

    /// Anyone may chat as a guest.
    fn guest(&self) -> Identity {
        Identity::Guest
    }
}

pub type SharedAuth = Arc<dyn AuthProvider + Send + Sync + 'static>;

/// Handles are compared case insensitively.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase()
}
