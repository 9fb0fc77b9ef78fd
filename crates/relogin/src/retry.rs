//! Exponential backoff retry for transient backend failures.
//!
//! [`with_retry`] wraps one backend call and re-runs it while the failure
//! classifies as transient. Session conflicts are deliberately not
//! transient; they go through [`crate::resolver::SessionResolver`] instead.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{BackendError, ErrorKind};

/// Upper bound of the random jitter added to each delay.
const JITTER_MAX_MS: u64 = 1_000;

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_use_jitter() -> bool {
    true
}

/// Backoff schedule for retried backend calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap applied to the exponential delay before jitter.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied per retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Adds up to one second of random jitter to each delay.
    #[serde(default = "default_use_jitter")]
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            use_jitter: default_use_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Reads overrides from `RELOGIN_RETRY_*`. Unset or unparsable values
    /// keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("RELOGIN_RETRY_MAX_ATTEMPTS", defaults.max_attempts),
            base_delay_ms: env_parse("RELOGIN_RETRY_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: env_parse("RELOGIN_RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
            backoff_factor: env_parse("RELOGIN_RETRY_BACKOFF_FACTOR", defaults.backoff_factor),
            use_jitter: env_parse("RELOGIN_RETRY_USE_JITTER", defaults.use_jitter),
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`
    /// (zero-based). The exponential part is capped at `max_delay_ms`;
    /// jitter is added on top of the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = exp.min(self.max_delay_ms as f64) as u64;
        let jitter = if self.use_jitter {
            (rand::random::<f64>() * JITTER_MAX_MS as f64) as u64
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default retry gate: only network and server failures are worth retrying.
pub fn default_should_retry(kind: ErrorKind) -> bool {
    kind.is_transient()
}

/// Retries `operation` under the default gate ([`default_should_retry`]).
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    with_retry_if(policy, default_should_retry, operation).await
}

/// Runs `operation` until it succeeds, the gate rejects the failure, or the
/// attempt budget runs out.
///
/// The operation always runs at least once, and the error handed back is
/// the untouched failure of the last attempt.
pub async fn with_retry_if<T, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
    P: Fn(ErrorKind) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                let kind = err.kind();
                if !should_retry(kind) {
                    debug!(kind = %kind, "failure is not retryable, giving up");
                    return Err(err);
                }
                if attempt >= policy.max_attempts.max(1) {
                    warn!(attempts = attempt, kind = %kind, "attempt budget exhausted");
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = %kind,
                    error = %err,
                    "transient failure, retrying after backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff_factor: 2.0,
            use_jitter: false,
        }
    }

    #[test]
    fn defaults_match_the_documented_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(policy.use_jitter);
    }

    #[test]
    fn delays_double_and_cap_without_jitter() {
        let policy = RetryPolicy {
            use_jitter: false,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_lands_inside_its_window() {
        let policy = RetryPolicy::default();
        let floor = Duration::from_millis(1_000);
        let ceiling = Duration::from_millis(2_000);

        for _ in 0..64 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= floor, "{delay:?} below the exponential floor");
            assert!(delay < ceiling, "{delay:?} past the jitter window");
        }
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert!(policy.use_jitter);
    }

    #[test]
    fn env_parse_keeps_default_when_unset() {
        assert_eq!(env_parse("RELOGIN_TEST_UNSET_KEY", 7u32), 7);
        assert!(env_parse("RELOGIN_TEST_UNSET_KEY", true));
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BackendError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(BackendError::timeout("socket hang up"))
                } else {
                    Ok::<_, BackendError>("session".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "session");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_short_circuit() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::status_only(401, "bad password"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_conflicts_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::api(
                    401,
                    "user_session_already_exists",
                    "session active",
                ))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::SessionConflict);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_the_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::status_only(500, format!("boom {n}")))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        // Four attempts total, and the surfaced error is the fourth one.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("boom 3"));
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy {
            max_attempts: 0,
            ..fast_policy()
        };

        let result: Result<(), _> = with_retry(&policy, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::timeout("slow"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_gate_overrides_the_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy {
            max_attempts: 2,
            ..fast_policy()
        };

        // Treat nothing as retryable: even a server error runs once.
        let result: Result<(), _> = with_retry_if(&policy, |_| false, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::status_only(500, "boom"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    mod property_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            // Without jitter the schedule never shrinks between attempts.
            #[test]
            fn delays_are_non_decreasing(
                base in 1u64..5_000,
                max in 1u64..60_000,
                factor in 1.0f64..4.0,
                attempt in 0u32..12
            ) {
                let policy = RetryPolicy {
                    max_attempts: 4,
                    base_delay_ms: base,
                    max_delay_ms: max,
                    backoff_factor: factor,
                    use_jitter: false,
                };
                prop_assert!(
                    policy.delay_for_attempt(attempt) <= policy.delay_for_attempt(attempt + 1)
                );
            }

            #[test]
            fn capped_delay_never_exceeds_max(
                base in 1u64..5_000,
                max in 1u64..60_000,
                factor in 1.0f64..4.0,
                attempt in 0u32..16
            ) {
                let policy = RetryPolicy {
                    max_attempts: 4,
                    base_delay_ms: base,
                    max_delay_ms: max,
                    backoff_factor: factor,
                    use_jitter: false,
                };
                let delay = policy.delay_for_attempt(attempt);
                prop_assert!(delay.as_millis() as u64 <= max);
            }

            // With jitter on, each delay stays within one second of the
            // jitter-free schedule.
            #[test]
            fn jitter_adds_less_than_one_second(attempt in 0u32..16) {
                let jittered = RetryPolicy::default();
                let plain = RetryPolicy { use_jitter: false, ..RetryPolicy::default() };

                let base = plain.delay_for_attempt(attempt);
                let delay = jittered.delay_for_attempt(attempt);
                prop_assert!(delay >= base);
                prop_assert!(delay < base + Duration::from_millis(1_000));
            }
        }
    }
}
