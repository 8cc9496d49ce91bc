//! Retry policy and injectable sleeping.
//!
//! Only knowledge-service creation retries internally; every other step is
//! made safe to repeat by adoption instead. Polling loops and propagation
//! waits go through the same [`Sleeper`] so tests can run them instantly.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::Result;

/// Suspends the orchestration for a fixed duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested duration.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Bounded attempts with a uniformly random pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(7, Duration::from_millis(1000), Duration::from_millis(2000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        let (min_backoff, max_backoff) = if min_backoff <= max_backoff {
            (min_backoff, max_backoff)
        } else {
            (max_backoff, min_backoff)
        };
        Self {
            max_attempts: max_attempts.max(1),
            min_backoff,
            max_backoff,
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A pause drawn uniformly from `[min_backoff, max_backoff]`.
    pub fn backoff(&self) -> Duration {
        let lo = self.min_backoff.as_millis() as u64;
        let hi = self.max_backoff.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let pause = self.backoff();
                    tracing::warn!(
                        step = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = pause.as_millis() as u64,
                        error = %err,
                        "retrying"
                    );
                    sleeper.sleep(pause).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KbError, ProviderError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let pause = policy.backoff();
            assert!(pause >= Duration::from_millis(1000) && pause <= Duration::from_millis(2000));
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let value = RetryPolicy::default()
            .run(&sleeper, "create knowledge base", |_| {
                let calls = &calls;
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(KbError::step("create knowledge base")(
                            ProviderError::Transient("busy".into()),
                        ))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(sleeper.calls().len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<()> = policy
            .run(&sleeper, "create knowledge base", |_| {
                let calls = &calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(KbError::AdoptionMiss {
                        kind: "knowledge base",
                        name: "demo".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.calls().len(), 2);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run(&sleeper, "x", |_| {
                let calls = &calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(KbError::validation("bad"))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.calls().is_empty());
    }
}
