//! Bounded retry with exponential backoff, per-call timeout, and
//! cancellation.
//!
//! Every network hop of an attempt runs through [`with_retry`]. Only
//! errors classified transient by [`Retryable`] are retried; terminal
//! errors surface immediately. Cancellation wins over both.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;

/// Classifies an error as transient (worth retrying) or terminal.
pub trait Retryable {
    /// Whether reissuing the operation could plausibly succeed.
    fn is_retryable(&self) -> bool;
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The attempt was cancelled while the operation ran or backed off.
    Cancelled,
    /// The final try hit the per-call timeout.
    TimedOut,
    /// Transient failures used up every configured try; the last is kept.
    Exhausted(E),
    /// A terminal error; never retried.
    Terminal(E),
}

/// Runs `op` under `policy`: per-call timeout, bounded retries with
/// exponential backoff on transient errors, cancellation at every
/// suspension point.
///
/// # Errors
///
/// Returns [`RetryError`] describing why the operation gave up.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    call_timeout: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut attempt = 1u32;
    loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = tokio::time::timeout(call_timeout, op()) => outcome,
        };
        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) if !error.is_retryable() => {
                return Err(RetryError::Terminal(error));
            }
            Ok(Err(error)) => {
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted(error));
                }
                #[cfg(feature = "telemetry")]
                tracing::warn!(%error, attempt, "transient failure, backing off");
            }
            Err(_elapsed) => {
                if attempt >= policy.max_attempts {
                    return Err(RetryError::TimedOut);
                }
                #[cfg(feature = "telemetry")]
                tracing::warn!(attempt, "call timed out, backing off");
            }
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
            () = tokio::time::sleep(policy.backoff(attempt)) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq, Eq, Clone)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Flaky)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(), Duration::from_secs(1), &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> =
            with_retry(&policy(), Duration::from_secs(1), &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            })
            .await;
        assert_eq!(result, Err(RetryError::Terminal(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_last_error() {
        let result: Result<u32, _> =
            with_retry(&policy(), Duration::from_secs(1), &CancellationToken::new(), || async {
                Err(TestError::Flaky)
            })
            .await;
        assert_eq!(result, Err(RetryError::Exhausted(TestError::Flaky)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let result: Result<u32, RetryError<TestError>> =
            with_retry(&policy(), Duration::from_millis(50), &CancellationToken::new(), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await;
        assert_eq!(result, Err(RetryError::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_over_ready_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<u32, RetryError<TestError>> =
            with_retry(&policy(), Duration::from_secs(1), &cancel, || async {
                Ok(1)
            })
            .await;
        // Cancellation is checked before the first call runs.
        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
