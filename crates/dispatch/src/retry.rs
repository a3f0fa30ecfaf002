//! Bounded store calls.
//!
//! Store calls made under a station lock go through this module so a slow
//! store cannot pin a station forever. Writes use [`bounded`]: every attempt
//! is capped by a timeout and transient failures are retried a fixed number
//! of times. Reads use [`timed`]: one attempt under the same timeout.

use std::future::Future;

use towtruck_core::error::CoreError;

use crate::config::DispatchConfig;

/// Run `op` with the timeout and retry budget from `config`.
///
/// Only retryable errors (see [`CoreError::is_retryable`]) are retried; a
/// timed-out attempt counts as a persistence failure.
pub async fn bounded<T, F, Fut>(
    config: &DispatchConfig,
    operation: &'static str,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = timed(config, operation, op()).await;

        match result {
            Err(e) if e.is_retryable() && attempt < config.max_attempts() => {
                tracing::warn!(
                    operation,
                    attempt,
                    error = %e,
                    "Store write failed, retrying",
                );
                tokio::time::sleep(config.retry_backoff).await;
            }
            other => return other,
        }
    }
}

/// Run a single store call under the commit timeout, without retrying.
pub async fn timed<T, Fut>(config: &DispatchConfig, operation: &'static str, call: Fut) -> Result<T, CoreError>
where
    Fut: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(config.commit_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Persistence(format!(
            "{operation} timed out after {}ms",
            config.commit_timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    fn fast_config(retries: u32) -> DispatchConfig {
        DispatchConfig {
            commit_retries: retries,
            retry_backoff: Duration::from_millis(1),
            commit_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = bounded(&fast_config(2), "save", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::Persistence("flaky".into()))
            } else {
                Ok(5)
            }
        })
        .await;

        assert_eq!(result, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = bounded(&fast_config(1), "save", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Persistence("down".into()))
        })
        .await;

        assert_matches!(result, Err(CoreError::Persistence(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = bounded(&fast_config(5), "load", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::NotFound {
                entity: "Accident",
                id: 1,
            })
        })
        .await;

        assert_matches!(result, Err(CoreError::NotFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let result: Result<(), _> = bounded(&fast_config(0), "save", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_matches!(result, Err(CoreError::Persistence(msg)) if msg.contains("timed out"));
    }

    #[tokio::test]
    async fn hung_read_times_out_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = timed(&fast_config(3), "load_accident", async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_matches!(result, Err(CoreError::Persistence(msg)) if msg.starts_with("load_accident timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
