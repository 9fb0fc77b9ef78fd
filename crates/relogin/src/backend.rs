//! Identity-backend contract and session data model.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Login credential pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl Credential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// Keeps the password out of logs and error chains.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .finish()
    }
}

/// An authenticated session as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Session operations of a hosted identity backend.
///
/// Implementations adapt one concrete provider; everything above this trait
/// only ever sees [`BackendError`] values.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Exchanges a credential for a fresh session.
    async fn begin_session(&self, credential: &Credential) -> Result<Session, BackendError>;

    /// Ends the session tied to the current client, if any.
    async fn end_current_session(&self) -> Result<(), BackendError>;

    /// Ends every session of the account across all clients.
    async fn end_all_sessions(&self) -> Result<(), BackendError>;
}

/// Asks the user to confirm a destructive action.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// Returns `true` when the user accepts `prompt`.
    async fn confirm(&self, prompt: &str) -> bool;
}
