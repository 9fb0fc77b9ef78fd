//! Shared conflict-resolution progress state.
//!
//! One [`ConflictStateStore`] is shared between the resolver, the manual
//! clear flow and whatever surface renders progress. Writers replace the
//! whole snapshot at once; overlapping resolutions follow last-writer-wins.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Remediation level applied while resolving a session conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationMethod {
    /// No remediation performed.
    #[default]
    None,
    /// Only the session tied to this client was ended.
    ClearCurrent,
    /// Every session of the account was ended.
    ClearAll,
}

impl RemediationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClearCurrent => "clear-current",
            Self::ClearAll => "clear-all",
        }
    }
}

impl fmt::Display for RemediationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the resolution progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolutionState {
    /// A remediation attempt is currently running.
    pub in_progress: bool,
    /// Method of the running or last finished attempt.
    pub method: RemediationMethod,
    /// The last attempt freed the account and the login went through.
    pub resolved: bool,
}

impl ConflictResolutionState {
    /// Progress line for the running attempt, `None` when nothing runs.
    pub fn progress_message(&self) -> Option<&'static str> {
        if !self.in_progress {
            return None;
        }
        match self.method {
            RemediationMethod::ClearCurrent => Some("clearing current session…"),
            RemediationMethod::ClearAll => Some("clearing all sessions…"),
            RemediationMethod::None => None,
        }
    }
}

/// Cheaply cloneable handle to the shared resolution state.
#[derive(Debug, Clone, Default)]
pub struct ConflictStateStore {
    inner: Arc<RwLock<ConflictResolutionState>>,
}

impl ConflictStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a remediation attempt as running.
    pub fn start(&self, method: RemediationMethod) {
        debug!(method = %method, "conflict remediation started");
        *self.inner.write() = ConflictResolutionState {
            in_progress: true,
            method,
            resolved: false,
        };
    }

    /// Marks the attempt as finished with the login restored.
    pub fn resolve(&self, method: RemediationMethod) {
        debug!(method = %method, "conflict resolved");
        *self.inner.write() = ConflictResolutionState {
            in_progress: false,
            method,
            resolved: true,
        };
    }

    /// Records that the attempt gave up without restoring the login.
    pub fn fail(&self) {
        debug!("conflict resolution failed");
        *self.inner.write() = ConflictResolutionState::default();
    }

    /// Returns the state to its idle value, e.g. when a new login form is
    /// opened.
    pub fn reset(&self) {
        *self.inner.write() = ConflictResolutionState::default();
    }

    /// Current snapshot.
    pub fn get(&self) -> ConflictResolutionState {
        *self.inner.read()
    }
}
