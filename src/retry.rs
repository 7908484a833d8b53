//! Retry and polling utilities for calls to the remote model.
//!
//! [`retry_async`] re-runs an operation with exponential backoff while the
//! error is transient. [`wait_until`] polls on a fixed interval until a
//! condition holds, bounded by a deadline and a cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Execute an async operation, retrying while `should_retry` accepts the error.
///
/// The operation receives the 1-based attempt number. Errors rejected by
/// `should_retry`, and the last error once retries run out, are returned as is.
pub async fn retry_async<F, Fut, T, E, P>(config: &RetryConfig, should_retry: P, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1u32;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt <= config.max_retries && should_retry(&e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = %config.operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    debug!("{} failed after {} attempts", config.operation_name, attempt);
                }
                return Err(e);
            }
        }
    }
}

/// Why [`wait_until`] stopped without a value
#[derive(Debug, PartialEq)]
pub enum WaitError<E> {
    /// The condition did not hold within the given duration
    Deadline(Duration),
    Cancelled,
    /// The poll itself failed
    Poll(E),
}

/// Poll every `interval` until `poll` yields `Some`, the `max_wait` deadline
/// passes, or `cancel` fires. The first poll happens one interval after the call.
pub async fn wait_until<F, Fut, T, E>(
    interval: Duration,
    max_wait: Duration,
    cancel: &CancellationToken,
    mut poll: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let deadline = start + max_wait;
    let mut ticker = tokio::time::interval_at(start + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = ticker.tick() => {}
            _ = tokio::time::sleep_until(deadline) => return Err(WaitError::Deadline(max_wait)),
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            outcome = poll() => outcome,
            _ = tokio::time::sleep_until(deadline) => return Err(WaitError::Deadline(max_wait)),
        };

        match outcome {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => debug!("Condition not met after {:?}", start.elapsed()),
            Err(e) => return Err(WaitError::Poll(e)),
        }
    }
}
