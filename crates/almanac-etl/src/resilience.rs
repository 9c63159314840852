//! Resilience primitives: retry with backoff, and request throttling.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::time::{sleep, Instant};

use crate::error::{HarvestError, HarvestResult};

/// Exponential backoff with jitter for transient failures.
///
/// Rate-limit responses carrying a `Retry-After` hint add that wait before
/// the next attempt, on top of the computed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, source_name: &str, mut op: F) -> HarvestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarvestResult<T>>,
    {
        let hint: Mutex<Option<Duration>> = Mutex::new(None);
        let hint = &hint;
        let max_delay = self.max_delay;

        let attempt = move || {
            let pending = hint.lock().unwrap_or_else(PoisonError::into_inner).take();
            let fut = op();
            async move {
                if let Some(wait) = pending {
                    log::debug!("Honoring Retry-After of {:?}", wait);
                    sleep(wait.min(max_delay)).await;
                }
                let result = fut.await;
                if let Err(ref e) = result {
                    *hint.lock().unwrap_or_else(PoisonError::into_inner) = e.retry_after();
                }
                result
            }
        };

        attempt
            .retry(self.backoff())
            .when(|e: &HarvestError| e.is_transient())
            .notify(|e: &HarvestError, delay: Duration| {
                log::warn!("{} request failed ({}); retrying in {:?}", source_name, e, delay);
            })
            .await
    }
}

/// Enforces a minimum interval between successive requests to one source.
///
/// Clones share the same clock, so one throttle can pace several clients.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last: Arc<tokio::sync::Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// call returned, then claim the slot.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
