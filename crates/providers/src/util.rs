//! Shared utility functions for provider adapters.

use crate::config::AuthConfig;
use agentrt_domain::error::CoreError;

/// Convert a [`reqwest::Error`] into the shared [`CoreError`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> CoreError {
    if e.is_timeout() {
        CoreError::Timeout(e.to_string())
    } else {
        CoreError::Model(e.to_string())
    }
}

/// Resolve the API key for a provider from its `AuthConfig`'s env var.
pub(crate) fn resolve_api_key(auth: &AuthConfig) -> agentrt_domain::error::Result<String> {
    let env_var = auth.env.as_deref().unwrap_or("LLM_API_KEY");
    std::env::var(env_var)
        .map_err(|_| CoreError::Config(format!("missing API key env var '{env_var}'")))
}
