// src/retry.rs
// Bounded exponential-backoff retry for calls to the remote model.
//
// Every generation, interpretation and video call goes through
// `with_retry`. Transient failures (rate limits, 5xx, timeouts, broken
// streams, network hiccups) are slept on and retried with a doubling delay;
// anything else, or the last failure once the budget is spent, is returned
// to the caller unchanged.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

/// HTTP-like status codes worth retrying.
const RETRYABLE_STATUSES: &[u16] = &[500, 503, 429];

/// Lowercased substrings of transient failures.
const RETRYABLE_SIGNATURES: &[&str] = &[
    // deadline / timeout
    "deadline",
    "timeout",
    "timed out",
    // overloaded / unavailable
    "overloaded",
    "unavailable",
    "resource_exhausted",
    "rate limit",
    "500",
    "503",
    "429",
    // malformed stream / parse
    "malformed",
    "parse",
    "unexpected end",
    "incomplete",
    // network / fetch
    "network",
    "fetch",
    "connection",
    "reset by peer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
}

/// Classify a failure by its status code and message.
///
/// A failure that carries neither a status nor a message cannot be
/// inspected and is treated as retryable.
pub fn classify(status: Option<u16>, message: &str) -> FailureClass {
    if let Some(code) = status {
        if RETRYABLE_STATUSES.contains(&code) {
            return FailureClass::Retryable;
        }
    }

    let message = message.trim().to_lowercase();
    if status.is_none() && message.is_empty() {
        return FailureClass::Retryable;
    }

    if RETRYABLE_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
    {
        FailureClass::Retryable
    } else {
        FailureClass::Fatal
    }
}

/// Errors that know whether they are worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each one.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }
}

/// Run `operation` until it succeeds, fails fatally, or the retry budget is
/// spent.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retries_left = policy.max_retries;
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{label} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retries_left > 0 => {
                warn!(
                    "{label} attempt {attempt} failed, retrying in {}ms ({retries_left} retries left): {err}",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                retries_left -= 1;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!("{label} gave up after {attempt} attempts: {err}");
                } else {
                    debug!("{label} failed with a non-retryable error: {err}");
                }
                return Err(err);
            }
        }
    }
}
