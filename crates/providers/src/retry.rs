//! Retry helper for LLM calls whose output must parse into a schema.
//!
//! Each attempt is a pure function of `(attempt number, temperature)`:
//! the temperature rises linearly per retry and attempts are separated by a
//! fixed backoff. Only parse/validation failures are retried; transport and
//! provider errors surface immediately.

use std::future::Future;
use std::time::Duration;

use tg_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_temperature: f32,
    pub temperature_step: f32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_temperature: 0.2,
            temperature_step: 0.1,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Temperature for a given 0-based attempt number.
    pub fn temperature_for(&self, attempt: u32) -> f32 {
        self.base_temperature + self.temperature_step * attempt as f32
    }
}

/// Run `call(temperature)` until it succeeds or attempts are exhausted.
///
/// `call` should make the LLM request *and* parse its output, returning
/// `Error::Json`/`Error::Executor` on shape mismatches — those trigger a
/// retry with escalated temperature. Any other error aborts.
pub async fn retry_on_json<T, F, Fut>(policy: RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut(f32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..policy.max_attempts.max(1) {
        let temperature = policy.temperature_for(attempt);
        match call(temperature).await {
            Ok(value) => return Ok(value),
            Err(e @ (Error::Json(_) | Error::Executor(_))) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    temperature,
                    error = %e,
                    "LLM output failed to parse; retrying"
                );
                last_err = Some(e);
                tokio::time::sleep(policy.backoff).await;
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Other("retry loop exhausted with no attempts".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_temperature: 0.2,
            temperature_step: 0.1,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn temperature_escalates_linearly() {
        let p = fast_policy();
        assert!((p.temperature_for(0) - 0.2).abs() < 1e-6);
        assert!((p.temperature_for(2) - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn retries_parse_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_on_json(fast_policy(), |_t| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Executor("bad shape".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_errors_abort_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_on_json(fast_policy(), |_t| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::Http("boom".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let result: Result<u32> = retry_on_json(fast_policy(), |_t| async {
            Err(Error::Executor("always bad".into()))
        })
        .await;
        match result {
            Err(Error::Executor(msg)) => assert_eq!(msg, "always bad"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
