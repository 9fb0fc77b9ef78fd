//! Shared doubles and fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::backend::{ConfirmPrompt, Credential, IdentityBackend, Session};
use crate::error::BackendError;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub(crate) fn sample_credential() -> Credential {
    Credential::new("dev@example.com", "hunter2")
}

pub(crate) fn sample_session(user_id: &str) -> Session {
    Session {
        id: format!("sess-{user_id}"),
        user_id: user_id.to_string(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub(crate) fn conflict_error() -> BackendError {
    BackendError::api(401, "user_session_already_exists", "session already active")
}

pub(crate) fn invalid_credentials_error() -> BackendError {
    BackendError::status_only(401, "invalid credentials")
}

pub(crate) fn server_error() -> BackendError {
    BackendError::status_only(500, "internal server error")
}

pub(crate) fn network_error() -> BackendError {
    BackendError::timeout("connect timed out")
}

/// Backend double driven by scripted per-call outcomes.
///
/// Each method pops the next scripted outcome from its queue; an empty
/// queue means success. Calls are counted across the whole test.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    begin: Mutex<VecDeque<Result<Session, BackendError>>>,
    end_current: Mutex<VecDeque<Result<(), BackendError>>>,
    end_all: Mutex<VecDeque<Result<(), BackendError>>>,
    begin_calls: AtomicU32,
    end_current_calls: AtomicU32,
    end_all_calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_begin(&self, outcome: Result<Session, BackendError>) {
        self.begin.lock().push_back(outcome);
    }

    pub fn script_end_current(&self, outcome: Result<(), BackendError>) {
        self.end_current.lock().push_back(outcome);
    }

    pub fn script_end_all(&self, outcome: Result<(), BackendError>) {
        self.end_all.lock().push_back(outcome);
    }

    pub fn begin_calls(&self) -> u32 {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn end_current_calls(&self) -> u32 {
        self.end_current_calls.load(Ordering::SeqCst)
    }

    pub fn end_all_calls(&self) -> u32 {
        self.end_all_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityBackend for ScriptedBackend {
    async fn begin_session(&self, _credential: &Credential) -> Result<Session, BackendError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        self.begin
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_session("user-1")))
    }

    async fn end_current_session(&self) -> Result<(), BackendError> {
        self.end_current_calls.fetch_add(1, Ordering::SeqCst);
        self.end_current.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn end_all_sessions(&self) -> Result<(), BackendError> {
        self.end_all_calls.fetch_add(1, Ordering::SeqCst);
        self.end_all.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Confirmation prompt that always answers the same way and counts calls.
pub(crate) struct StaticConfirm {
    answer: bool,
    calls: AtomicU32,
}

impl StaticConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmPrompt for StaticConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}
