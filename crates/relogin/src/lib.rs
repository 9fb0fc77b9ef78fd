//! Session-conflict resolution and retry for hosted identity backends.
//!
//! Hosted identity services that cap concurrent sessions refuse a login
//! while an older session is still alive somewhere else. This crate wraps
//! such a backend with the plumbing an application needs around that
//! refusal:
//!
//! - [`error`]: raw-to-classified failure mapping ([`ErrorKind`],
//!   [`ClassifiedError`]), so callers never match on status codes
//! - [`retry`]: capped exponential backoff for transient failures
//!   ([`RetryPolicy`], [`with_retry`])
//! - [`resolver`]: escalating conflict resolution around login
//!   ([`SessionResolver`])
//! - [`manual`]: user-initiated clear of every session
//!   ([`ManualSessionClear`])
//! - [`state`]: shared progress state a UI can render
//!   ([`ConflictStateStore`])
//!
//! The backend itself stays behind [`IdentityBackend`]; an implementation
//! adapts one concrete provider and surfaces raw failures as
//! [`BackendError`].

pub mod backend;
pub mod config;
pub mod error;
pub mod manual;
pub mod resolver;
pub mod retry;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

pub use backend::{ConfirmPrompt, Credential, IdentityBackend, Session};
pub use config::ResolverConfig;
pub use error::{
    BackendError, ClassifiedError, ErrorKind, FailureCause, ResolveError, SESSION_CONFLICT_TYPES,
};
pub use manual::{ManualClearOptions, ManualClearResult, ManualSessionClear};
pub use resolver::SessionResolver;
pub use retry::{RetryPolicy, default_should_retry, with_retry, with_retry_if};
pub use state::{ConflictResolutionState, ConflictStateStore, RemediationMethod};
