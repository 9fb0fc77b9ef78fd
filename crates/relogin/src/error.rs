//! Error types and classification for identity-backend failures.
//!
//! Backend adapters surface raw failures as [`BackendError`]. Everything
//! above them works with [`ClassifiedError`], which pins down a stable
//! [`ErrorKind`] so callers never match on raw status codes or provider
//! `type` strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::RemediationMethod;

/// Backend `type` codes that signal an active-session conflict.
pub const SESSION_CONFLICT_TYPES: &[&str] =
    &["user_session_already_exists", "session_already_exists"];

/// Backend `type` codes that signal a scope or permission refusal.
const PERMISSION_TYPES: &[&str] = &["general_unauthorized_scope", "user_unauthorized"];

/// Raw failure surfaced by an identity backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend answered with a structured API error.
    #[error("identity API error ({status}): {message}")]
    Api {
        status: u16,
        /// Machine-readable code such as `user_session_already_exists`.
        error_type: Option<String>,
        message: String,
    },

    /// The request never produced a usable response.
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The call was abandoned before the backend answered.
    #[error("request timed out: {reason}")]
    Timeout { reason: String },

    /// Local failure before or after the backend call.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl BackendError {
    pub fn api(status: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            error_type: Some(error_type.into()),
            message: message.into(),
        }
    }

    /// API error without a machine-readable code.
    pub fn status_only(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            error_type: None,
            message: message.into(),
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Builds an API error from a raw HTTP status and response body.
    ///
    /// Bodies are expected to look like `{"message": "...", "type": "..."}`.
    /// Anything else degrades to a status-only error with a generic message.
    pub fn from_status_body(status: u16, body: &str) -> Self {
        let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("identity backend call failed")
            .to_string();
        let error_type = value.get("type").and_then(Value::as_str).map(String::from);
        Self::Api {
            status,
            error_type,
            message,
        }
    }

    /// HTTP status attached to this failure, when one exists.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network(source) => source.status().map(|s| s.as_u16()),
            Self::Timeout { .. } | Self::Internal { .. } => None,
        }
    }

    /// Machine-readable backend code, when the backend sent one.
    pub fn error_type(&self) -> Option<&str> {
        match self {
            Self::Api { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }

    /// Classifies this failure using only the built-in conflict codes.
    pub fn kind(&self) -> ErrorKind {
        self.kind_with(&[])
    }

    /// Classifies this failure, treating `extra_conflict_types` as
    /// additional session-conflict codes on top of
    /// [`SESSION_CONFLICT_TYPES`].
    ///
    /// Backend codes win over the HTTP status, the status table applies
    /// next, and statusless connection failures map to
    /// [`ErrorKind::Network`].
    pub fn kind_with(&self, extra_conflict_types: &[String]) -> ErrorKind {
        if let Some(code) = self.error_type() {
            if SESSION_CONFLICT_TYPES.contains(&code)
                || extra_conflict_types.iter().any(|t| t == code)
            {
                return ErrorKind::SessionConflict;
            }
            if PERMISSION_TYPES.contains(&code) {
                return ErrorKind::Permission;
            }
        }
        if let Some(status) = self.http_status() {
            return match status {
                401 | 403 => ErrorKind::InvalidCredentials,
                404 => ErrorKind::NotFound,
                400 | 422 => ErrorKind::Validation,
                s if s >= 500 => ErrorKind::Server,
                _ => ErrorKind::Unknown,
            };
        }
        match self {
            Self::Network(_) | Self::Timeout { .. } => ErrorKind::Network,
            Self::Api { .. } | Self::Internal { .. } => ErrorKind::Unknown,
        }
    }
}

/// Stable classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The backend rejected the credential itself.
    InvalidCredentials,
    /// A session is already active for the account.
    SessionConflict,
    /// Connection-level failure, nothing reached the backend.
    Network,
    /// The backend is failing on its side.
    Server,
    /// The submitted values were rejected as malformed.
    Validation,
    /// The account lacks the scope for this call.
    Permission,
    /// The addressed resource does not exist.
    NotFound,
    Unknown,
}

impl ErrorKind {
    /// Transient failures worth retrying without user action.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Server)
    }

    /// Whether changed input or a later retry can plausibly succeed.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::Permission | Self::NotFound | Self::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::SessionConflict => "session_conflict",
            Self::Network => "network",
            Self::Server => "server",
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid email or password.",
            Self::SessionConflict => "Another session is already active for this account.",
            Self::Network => "Network error. Check your connection and try again.",
            Self::Server => "The service is temporarily unavailable. Try again shortly.",
            Self::Validation => "Some submitted values were rejected. Review them and try again.",
            Self::Permission => "Your account is not allowed to perform this action.",
            Self::NotFound => "The requested account resource was not found.",
            Self::Unknown => "Something went wrong. Try again or contact support.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend failure after classification, with the raw error as source.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    /// Machine-readable backend code, when one was sent.
    pub backend_type: Option<String>,
    pub message: String,
    #[source]
    pub cause: BackendError,
}

impl ClassifiedError {
    pub fn classify(raw: BackendError) -> Self {
        Self::classify_with(raw, &[])
    }

    pub fn classify_with(raw: BackendError, extra_conflict_types: &[String]) -> Self {
        let kind = raw.kind_with(extra_conflict_types);
        let http_status = raw.http_status();
        let backend_type = raw.error_type().map(String::from);
        let message = match &raw {
            BackendError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind,
            http_status,
            backend_type,
            message,
            cause: raw,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

/// Why automatic conflict resolution gave up.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// Both the narrow and the broad remediation calls failed.
    #[error("both remediations failed (clear-current: {clear_current}, clear-all: {clear_all})")]
    RemediationExhausted {
        clear_current: ClassifiedError,
        clear_all: ClassifiedError,
    },

    /// A remediation call succeeded but the follow-up login still failed.
    #[error("login retry after remediation failed: {0}")]
    RetryRejected(#[source] ClassifiedError),
}

/// Failure of a login driven through conflict resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The login failed with something other than a session conflict.
    #[error("login failed: {0}")]
    Login(#[source] ClassifiedError),

    /// A session conflict was detected and escalation could not clear it.
    #[error("unresolved session conflict after {method} remediation: {cause}")]
    ResolutionFailed {
        /// The conflict that started the escalation.
        conflict: ClassifiedError,
        /// Remediation level reached before giving up.
        method: RemediationMethod,
        #[source]
        cause: FailureCause,
    },
}

impl ResolveError {
    /// Classification the caller should react to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Login(err) => err.kind,
            Self::ResolutionFailed { .. } => ErrorKind::SessionConflict,
        }
    }

    /// `false` once escalation has been tried and lost.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Login(err) => err.is_recoverable(),
            Self::ResolutionFailed { .. } => false,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Login(err) => err.user_message(),
            Self::ResolutionFailed { .. } => {
                "We could not free up a session for this account. \
                 Sign out of other devices and try again."
            }
        }
    }
}
