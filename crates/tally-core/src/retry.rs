//! Bounded retry with exponential backoff and jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{FetchError, JudgeError};

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-provided delay hint (e.g. `Retry-After`).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        FetchError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        FetchError::retry_after(self)
    }
}

impl Retryable for JudgeError {
    fn is_retryable(&self) -> bool {
        JudgeError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        JudgeError::retry_after(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// No backoff; used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, 0, 0)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        if let Some(hint) = hint {
            let base_ms = hint.min(cap).as_millis() as u64;
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            return Duration::from_millis(((base_ms as f64) * jitter_factor).round() as u64);
        }
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let shift = retry.saturating_sub(1).min(16);
        let base = Duration::from_millis(self.base_delay_ms.saturating_mul(1 << shift)).min(cap);
        let jittered_ms = rand::thread_rng().gen_range(base.as_millis() as u64 / 2..=base.as_millis() as u64);
        Duration::from_millis(jittered_ms)
    }
}

/// Final error after all attempts, with the number of attempts made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempts)", self.error, self.attempts)
    }
}

impl<E: std::fmt::Debug + Display> std::error::Error for RetryError<E> {}

/// Runs `op` until it succeeds, fails permanently, or retries are exhausted.
/// `op` receives the 1-based attempt number. Returns the value and attempts used.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<(T, u32), RetryError<E>>
where
    E: Retryable + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if e.is_retryable() && attempt <= policy.max_retries => {
                let backoff = policy.backoff(attempt, e.retry_after());
                warn!(
                    error = %e,
                    what,
                    retry = attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying"
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryError {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}
