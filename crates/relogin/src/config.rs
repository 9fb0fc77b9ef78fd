//! Resolver configuration.

use serde::{Deserialize, Serialize};

fn default_confirm_prompt() -> String {
    "Sign out of all other sessions for this account?".to_string()
}

/// Deployment-level knobs shared by the resolver and the manual clear flow.
///
/// The built-in conflict codes live in
/// [`crate::error::SESSION_CONFLICT_TYPES`]; this only carries additions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Extra backend `type` codes to treat as session conflicts.
    #[serde(default)]
    pub conflict_error_types: Vec<String>,
    /// Question asked before a manual clear-all.
    #[serde(default = "default_confirm_prompt")]
    pub confirm_prompt: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            conflict_error_types: Vec::new(),
            confirm_prompt: default_confirm_prompt(),
        }
    }
}

impl ResolverConfig {
    /// Reads overrides from the environment.
    ///
    /// `RELOGIN_CONFLICT_ERROR_TYPES` takes a comma-separated list of extra
    /// conflict codes; `RELOGIN_CONFIRM_PROMPT` replaces the confirmation
    /// question.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let conflict_error_types = std::env::var("RELOGIN_CONFLICT_ERROR_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.conflict_error_types);
        let confirm_prompt =
            std::env::var("RELOGIN_CONFIRM_PROMPT").unwrap_or(defaults.confirm_prompt);
        Self {
            conflict_error_types,
            confirm_prompt,
        }
    }
}
