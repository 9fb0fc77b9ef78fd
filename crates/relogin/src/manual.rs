//! User-initiated clear of every session on the account.
//!
//! The escape hatch for accounts wedged in a conflicted state the automatic
//! escalation could not fix. Unlike [`crate::resolver::SessionResolver`],
//! this flow never fails the caller: every outcome, including backend
//! errors, comes back inside [`ManualClearResult`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::backend::{ConfirmPrompt, IdentityBackend};
use crate::config::ResolverConfig;
use crate::error::ClassifiedError;
use crate::state::{ConflictStateStore, RemediationMethod};

/// Options for one manual clear invocation.
#[derive(Debug, Clone)]
pub struct ManualClearOptions {
    /// Ask before clearing. On by default.
    pub require_confirmation: bool,
    /// Overrides the configured confirmation question.
    pub prompt: Option<String>,
}

impl Default for ManualClearOptions {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            prompt: None,
        }
    }
}

impl ManualClearOptions {
    /// Skips the confirmation step.
    pub fn unconfirmed() -> Self {
        Self {
            require_confirmation: false,
            prompt: None,
        }
    }
}

/// Outcome of a manual clear. Failures are data, not errors.
#[derive(Debug)]
pub struct ManualClearResult {
    pub success: bool,
    /// The user declined the confirmation question.
    pub cancelled: bool,
    /// Operator-facing summary line.
    pub message: String,
    /// End-user-facing summary line.
    pub user_message: String,
    pub error: Option<ClassifiedError>,
    pub timestamp: DateTime<Utc>,
}

impl ManualClearResult {
    fn cleared() -> Self {
        Self {
            success: true,
            cancelled: false,
            message: "all sessions cleared".to_string(),
            user_message: "You have been signed out everywhere.".to_string(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn declined() -> Self {
        Self {
            success: false,
            cancelled: true,
            message: "cancelled".to_string(),
            user_message: "Sign-out was cancelled.".to_string(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failed(error: ClassifiedError) -> Self {
        Self {
            success: false,
            cancelled: false,
            message: format!("session clear failed: {error}"),
            user_message: error.user_message().to_string(),
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Clears every session of the account on explicit user request.
pub struct ManualSessionClear {
    backend: Arc<dyn IdentityBackend>,
    state: ConflictStateStore,
    config: ResolverConfig,
    confirm: Option<Arc<dyn ConfirmPrompt>>,
}

impl ManualSessionClear {
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        state: ConflictStateStore,
        config: ResolverConfig,
    ) -> Self {
        Self {
            backend,
            state,
            config,
            confirm: None,
        }
    }

    /// Routes confirmation questions through `prompt`.
    pub fn with_confirm(mut self, prompt: Arc<dyn ConfirmPrompt>) -> Self {
        self.confirm = Some(prompt);
        self
    }

    /// Asks for confirmation when requested, then ends all sessions.
    #[instrument(skip_all)]
    pub async fn clear(&self, options: &ManualClearOptions) -> ManualClearResult {
        if options.require_confirmation {
            let question = options.prompt.as_deref().unwrap_or(&self.config.confirm_prompt);
            match &self.confirm {
                Some(confirm) => {
                    if !confirm.confirm(question).await {
                        info!("manual session clear declined");
                        return ManualClearResult::declined();
                    }
                }
                // An absent prompt counts as confirmed.
                None => debug!("no confirmation prompt wired up, proceeding"),
            }
        }

        self.state.start(RemediationMethod::ClearAll);
        info!("clearing all sessions on user request");
        match self.backend.end_all_sessions().await {
            Ok(()) => {
                self.state.resolve(RemediationMethod::ClearAll);
                info!("all sessions cleared");
                ManualClearResult::cleared()
            }
            Err(raw) => {
                let error = ClassifiedError::classify_with(raw, &self.config.conflict_error_types);
                self.state.fail();
                warn!(kind = %error.kind, error = %error, "manual session clear failed");
                ManualClearResult::failed(error)
            }
        }
    }
}
