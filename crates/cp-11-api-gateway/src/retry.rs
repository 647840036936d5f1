//! Transient-failure retry for request handlers.

use crate::TRANSIENT_RETRIES;
use rand::Rng;
use shared_types::ErrorCode;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Whether a wire code is worth an automatic in-request retry.
fn retryable(code: ErrorCode) -> bool {
    matches!(code, ErrorCode::Transient)
}

/// Run `op` with up to [`TRANSIENT_RETRIES`] retries on transient errors,
/// each delayed by a short jitter. A still-failing call surfaces
/// `Unavailable` (the caller maps the code).
pub async fn retry_transient<T, E, F, Fut>(mut op: F, code_of: fn(&E) -> ErrorCode) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(code_of(&e)) && attempt < TRANSIENT_RETRIES => {
                attempt += 1;
                let jitter_ms = rand::thread_rng().gen_range(25..=150) * attempt as u64;
                debug!(attempt, jitter_ms, "Transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError(ErrorCode);

    fn code_of(e: &TestError) -> ErrorCode {
        e.0
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError(ErrorCode::Transient))
                    } else {
                        Ok(n)
                    }
                }
            },
            code_of,
        )
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry_transient(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(ErrorCode::Transient)) }
            },
            code_of,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1 + TRANSIENT_RETRIES);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry_transient(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(ErrorCode::NotFound)) }
            },
            code_of,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
