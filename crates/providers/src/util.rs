//! Shared utility functions for provider adapters.

use tg_domain::config::ProviderConfig;
use tg_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key for a provider from its configured env var.
pub(crate) fn resolve_api_key(cfg: &ProviderConfig) -> Result<String> {
    std::env::var(&cfg.api_key_env).map_err(|_| {
        Error::Auth(format!(
            "environment variable '{}' not set or not valid UTF-8",
            cfg.api_key_env
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_names_the_variable() {
        let cfg = ProviderConfig {
            id: "p".into(),
            kind: "openai_compat".into(),
            base_url: "http://x".into(),
            api_key_env: "TG_TEST_NONEXISTENT_VAR_8888".into(),
            default_model: None,
        };
        let err = resolve_api_key(&cfg).unwrap_err();
        assert!(err.to_string().contains("TG_TEST_NONEXISTENT_VAR_8888"));
    }
}
