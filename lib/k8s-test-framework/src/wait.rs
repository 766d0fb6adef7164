//! Poll a condition until it holds or a timeout elapses.

use std::{fmt::Display, future::Future, time::Duration};

use snafu::Snafu;
use tracing::debug;

/// A poll that never succeeded within its timeout.
#[derive(Debug, Snafu)]
#[snafu(display("{}", last))]
pub struct TimedOut {
    /// The failure reported by the last check.
    pub last: String,
}

/// Run `check` every `interval` until it returns `Ok`, giving up once waiting
/// another interval would exceed `timeout`.
///
/// The condition is checked at least once. A zero `interval` is treated as one
/// second so that the loop always advances.
pub async fn until<F, Fut, T, E>(timeout: Duration, interval: Duration, mut check: F) -> Result<T, TimedOut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let interval = if interval.is_zero() {
        Duration::from_secs(1)
    } else {
        interval
    };
    let mut elapsed = Duration::ZERO;
    loop {
        match check().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if elapsed + interval > timeout {
                    return Err(TimedOut {
                        last: error.to_string(),
                    });
                }
                debug!(message = "Condition not met yet.", %error, ?elapsed);
            }
        }
        tokio::time::sleep(interval).await;
        elapsed += interval;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = until(Duration::from_secs(10), Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 3 { Err("not yet") } else { Ok(n) }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = until(Duration::from_secs(5), Duration::from_secs(2), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(format!("attempt {n}"))
            }
        })
        .await
        .unwrap_err();
        // Checks at 0s, 2s and 4s; 6s would exceed the timeout.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "attempt 2");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_checks_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = until(Duration::ZERO, Duration::ZERO, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("never")
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
