//! Escalating session-conflict resolution around backend logins.
//!
//! A hosted identity backend that caps concurrent sessions rejects a login
//! while one is still active elsewhere. [`SessionResolver::login`] turns
//! that refusal into an escalation ladder: end the current client's session
//! and retry, then end every session and retry, then give up with the full
//! failure context attached.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::backend::{Credential, IdentityBackend, Session};
use crate::config::ResolverConfig;
use crate::error::{BackendError, ClassifiedError, ErrorKind, FailureCause, ResolveError};
use crate::state::{ConflictStateStore, RemediationMethod};

/// Escalation phases of one conflict resolution.
///
/// [`advance`] is the transition table; the driver in [`SessionResolver`]
/// walks it one backend call at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ClearingCurrent,
    RetryingAfterCurrent,
    ClearingAll,
    RetryingAfterAll,
    Done,
    Failed,
}

impl Phase {
    /// Remediation level a phase operates under.
    fn method(self) -> RemediationMethod {
        match self {
            Phase::ClearingCurrent | Phase::RetryingAfterCurrent => RemediationMethod::ClearCurrent,
            Phase::ClearingAll | Phase::RetryingAfterAll => RemediationMethod::ClearAll,
            Phase::Idle | Phase::Done | Phase::Failed => RemediationMethod::None,
        }
    }
}

/// Next phase once the current phase's backend call has finished.
///
/// For `Idle` that call is the initial login, and `step_ok == false` means
/// it was refused with a session conflict; non-conflict failures never
/// enter the machine. Escalation moves strictly from the narrow remediation
/// to the broad one, a failed retry is final, and the terminal phases
/// absorb every outcome.
fn advance(phase: Phase, step_ok: bool) -> Phase {
    match (phase, step_ok) {
        (Phase::Idle, true) => Phase::Done,
        (Phase::Idle, false) => Phase::ClearingCurrent,
        (Phase::ClearingCurrent, true) => Phase::RetryingAfterCurrent,
        (Phase::ClearingCurrent, false) => Phase::ClearingAll,
        (Phase::RetryingAfterCurrent, true) => Phase::Done,
        (Phase::RetryingAfterCurrent, false) => Phase::Failed,
        (Phase::ClearingAll, true) => Phase::RetryingAfterAll,
        (Phase::ClearingAll, false) => Phase::Failed,
        (Phase::RetryingAfterAll, true) => Phase::Done,
        (Phase::RetryingAfterAll, false) => Phase::Failed,
        (Phase::Done, _) => Phase::Done,
        (Phase::Failed, _) => Phase::Failed,
    }
}

/// Login front door that resolves active-session conflicts.
pub struct SessionResolver {
    backend: Arc<dyn IdentityBackend>,
    state: ConflictStateStore,
    config: ResolverConfig,
}

impl SessionResolver {
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        state: ConflictStateStore,
        config: ResolverConfig,
    ) -> Self {
        Self {
            backend,
            state,
            config,
        }
    }

    /// Shared progress state, for wiring into a UI.
    pub fn state(&self) -> &ConflictStateStore {
        &self.state
    }

    fn classify(&self, raw: BackendError) -> ClassifiedError {
        ClassifiedError::classify_with(raw, &self.config.conflict_error_types)
    }

    /// Logs in, resolving an active-session conflict if one comes up.
    ///
    /// Anything other than a conflict passes through as
    /// [`ResolveError::Login`] without touching the shared state.
    #[instrument(skip(self, credential), fields(email = %credential.email))]
    pub async fn login(&self, credential: &Credential) -> Result<Session, ResolveError> {
        match self.backend.begin_session(credential).await {
            Ok(session) => {
                info!(user_id = %session.user_id, "login succeeded");
                Ok(session)
            }
            Err(raw) => {
                let classified = self.classify(raw);
                if classified.kind != ErrorKind::SessionConflict {
                    warn!(kind = %classified.kind, error = %classified, "login failed");
                    return Err(ResolveError::Login(classified));
                }
                info!(
                    backend_type = classified.backend_type.as_deref().unwrap_or("unknown"),
                    "active session conflict detected, starting escalation"
                );
                self.resolve_conflict(credential, classified).await
            }
        }
    }

    /// Walks the escalation ladder for a classified session conflict.
    async fn resolve_conflict(
        &self,
        credential: &Credential,
        conflict: ClassifiedError,
    ) -> Result<Session, ResolveError> {
        let phase = advance(Phase::Idle, false);
        self.state.start(phase.method());
        debug!(method = %phase.method(), "ending the current session");
        match self.backend.end_current_session().await {
            Ok(()) => {
                let phase = advance(phase, true);
                self.retry_login(credential, conflict, phase).await
            }
            Err(raw) => {
                let clear_current = self.classify(raw);
                warn!(
                    error = %clear_current,
                    "current-session clear failed, escalating to clear-all"
                );
                let phase = advance(phase, false);
                self.state.start(phase.method());
                debug!(method = %phase.method(), "ending all sessions");
                match self.backend.end_all_sessions().await {
                    Ok(()) => {
                        let phase = advance(phase, true);
                        self.retry_login(credential, conflict, phase).await
                    }
                    Err(raw) => {
                        let clear_all = self.classify(raw);
                        self.state.fail();
                        error!(
                            clear_current = %clear_current,
                            clear_all = %clear_all,
                            "both remediations failed, conflict resolution exhausted"
                        );
                        Err(ResolveError::ResolutionFailed {
                            conflict,
                            method: phase.method(),
                            cause: FailureCause::RemediationExhausted {
                                clear_current,
                                clear_all,
                            },
                        })
                    }
                }
            }
        }
    }

    /// One post-remediation login. Its failure is final for the whole
    /// resolution; escalation never restarts from here.
    async fn retry_login(
        &self,
        credential: &Credential,
        conflict: ClassifiedError,
        phase: Phase,
    ) -> Result<Session, ResolveError> {
        let method = phase.method();
        debug!(method = %method, "retrying login after remediation");
        match self.backend.begin_session(credential).await {
            Ok(session) => {
                self.state.resolve(method);
                info!(
                    user_id = %session.user_id,
                    method = %method,
                    "login restored after conflict remediation"
                );
                Ok(session)
            }
            Err(raw) => {
                let rejected = self.classify(raw);
                self.state.fail();
                warn!(
                    method = %method,
                    error = %rejected,
                    "login still refused after remediation"
                );
                Err(ResolveError::ResolutionFailed {
                    conflict,
                    method,
                    cause: FailureCause::RetryRejected(rejected),
                })
            }
        }
    }
}
