//! Poll-until-deadline helper

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Run `attempt` every `interval` until it succeeds or `timeout` elapses.
///
/// Only not-found failures are retried; anything else is returned immediately.
/// An attempt still running at the deadline is cancelled. On timeout the error
/// carries the message of the last failed attempt.
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;
    let mut last_error: Option<Error> = None;

    loop {
        attempts += 1;
        match tokio::time::timeout_at(deadline, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_not_found() => last_error = Some(e),
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep_until((now + interval).min(deadline)).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    debug!("poll_until gave up after {} attempts", attempts);
    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempt completed".to_string());
    Err(Error::timeout(format!(
        "gave up after {}ms: {}",
        timeout.as_millis(),
        reason
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = poll_until(Duration::from_millis(100), Duration::from_secs(5), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(Error::element_not_found("#late"))
                } else {
                    Ok("found")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "found");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_last_error() {
        let start = Instant::now();
        let err = poll_until(Duration::from_millis(100), Duration::from_millis(1000), || async {
            Err::<(), _>(Error::element_not_found("#never"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.to_string().contains("#never"));
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = poll_until(Duration::from_millis(100), Duration::from_secs(5), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::cdp("Element is not attached to the DOM"))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cdp(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_starts_at_deadline() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();
        let err = poll_until(Duration::from_millis(100), Duration::from_millis(300), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(Error::element_not_found("#slow"))
                } else {
                    std::future::pending::<Result<()>>().await
                }
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.to_string().contains("#slow"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_is_cancelled() {
        let err = poll_until(Duration::from_millis(100), Duration::from_millis(300), || async {
            std::future::pending::<Result<()>>().await
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
