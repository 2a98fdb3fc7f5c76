//! Retry and polling policies.
//!
//! One abstraction (interval, max attempts, optional initial delay) drives
//! the health probe, preview and HQ task polling, and storefront-URL polling.
//! What happens on exhaustion is left to the caller: the health probe reports
//! offline, preview polling fails, storefront polling degrades to a fallback.

use std::cell::Cell;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use tracing::{debug, warn};

use crate::error::{Result, SunprintError};

/// Fixed-interval policy with a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first attempt.
    pub initial_delay: Duration,
    /// Wait between attempts.
    pub interval: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

/// Result of one polling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick<T> {
    Ready(T),
    Pending,
}

/// Terminal outcome of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl RetryPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval,
            max_attempts,
        }
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Upper bound on time spent waiting between attempts.
    pub fn ceiling(&self) -> Duration {
        self.initial_delay + self.interval * self.max_attempts.saturating_sub(1)
    }

    /// Call `tick` until it reports ready or the attempts run out.
    ///
    /// Errors returned by `tick` abort the loop; callers that want to keep
    /// polling through errors map them to [`Tick::Pending`] themselves.
    pub async fn poll<T, F, Fut>(&self, mut tick: F) -> Result<PollOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Tick<T>>>,
    {
        if !self.initial_delay.is_zero() {
            tokio::time::sleep(self.initial_delay).await;
        }

        for attempt in 1..=self.max_attempts {
            match tick(attempt).await? {
                Tick::Ready(value) => {
                    debug!(attempt, "Poll ready");
                    return Ok(PollOutcome::Ready {
                        value,
                        attempts: attempt,
                    });
                }
                Tick::Pending => {
                    debug!(attempt, max_attempts = self.max_attempts, "Poll pending");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        Ok(PollOutcome::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Constant backoff that stops after `max_attempts - 1` retries.
    pub fn backoff(&self) -> CappedConstant {
        CappedConstant::new(self.interval, self.max_attempts.saturating_sub(1))
    }

    /// Run `operation`, retrying only [`SunprintError::Unreachable`] failures.
    ///
    /// Other errors are permanent and returned immediately. `on_retry`
    /// receives the failed attempt number before each wait.
    pub async fn retry_unreachable<T, F, Fut, N>(
        &self,
        mut operation: F,
        mut on_retry: N,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        N: FnMut(u32, &SunprintError),
    {
        let attempt = Cell::new(0u32);
        retry_notify(
            self.backoff(),
            || {
                attempt.set(attempt.get() + 1);
                let fut = operation();
                async move {
                    fut.await.map_err(|err| {
                        if err.is_unreachable() {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: SunprintError, wait: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = wait.as_millis() as u64,
                    "Retry scheduled"
                );
                on_retry(attempt.get(), &err);
            },
        )
        .await
    }
}

/// [`Backoff`] with a fixed interval and a retry cap.
#[derive(Debug, Clone)]
pub struct CappedConstant {
    interval: Duration,
    max_retries: u32,
    remaining: u32,
}

impl CappedConstant {
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
            remaining: max_retries,
        }
    }
}

impl Backoff for CappedConstant {
    fn reset(&mut self) {
        self.remaining = self.max_retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }
}
