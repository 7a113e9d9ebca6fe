//! Retry of whole ledger transactions on SQLite contention.

use super::LedgerError;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `operation` until it succeeds, fails with a non-contention error, or
/// `max_elapsed` runs out. Each attempt must open and commit its own
/// transaction so a retry starts from the committed state.
pub async fn with_contention_retry<T, F, Fut>(
    max_elapsed: Duration,
    label: &'static str,
    mut operation: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(250),
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    retry(backoff, || {
        let attempt = operation();
        async move {
            attempt.await.map_err(|e| {
                if e.is_contention() {
                    warn!(operation = label, error = %e, "Ledger contention, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_contention_then_succeeds() {
        let attempts = AtomicUsize::new(0);
        let result = with_contention_retry(Duration::from_secs(2), "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LedgerError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = with_contention_retry(Duration::from_secs(2), "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::InvalidMatchCandidate) }
        })
        .await;

        assert!(matches!(result, Err(LedgerError::InvalidMatchCandidate)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
