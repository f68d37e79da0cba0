//! Retry policy with exponential backoff and full jitter
//!
//! Wraps any async operation and re-runs it while its error is classified as
//! transient, up to a fixed number of retries after the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::limits;
use crate::errors::{FileError, TransportError};

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_transient(&self) -> bool {
        TransportError::is_transient(self)
    }
}

impl Retryable for FileError {
    fn is_transient(&self) -> bool {
        FileError::is_transient(self)
    }
}

/// Exponential backoff retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every following one
    pub base_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
    /// Randomize each delay uniformly in `[0, backoff]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: limits::MAX_RETRIES,
            base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(limits::MAX_BACKOFF_SECS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
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

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `retry` (1-based), before jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as u64;
        let exponent = retry.saturating_sub(1).min(32);
        let exponential = base_millis.saturating_mul(1u64 << exponent);
        let capped = exponential.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Delay actually slept before retry number `retry`
    pub fn delay(&self, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        if !self.jitter || backoff.is_zero() {
            return backoff;
        }
        Duration::from_millis(fastrand::u64(0..=backoff.as_millis() as u64))
    }

    /// Run `operation`, retrying errors that are transient
    ///
    /// ```
    /// use std::time::Duration;
    /// use worldpop_fetcher::app::RetryPolicy;
    /// use worldpop_fetcher::errors::TransportError;
    ///
    /// # tokio_test::block_on(async {
    /// let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(1));
    /// let mut failures = 2;
    /// let result = policy
    ///     .run("example", || {
    ///         let fail = failures > 0;
    ///         failures -= 1;
    ///         async move {
    ///             if fail {
    ///                 Err(TransportError::Status { status: 503, url: "f.tif".into() })
    ///             } else {
    ///                 Ok(42)
    ///             }
    ///         }
    ///     })
    ///     .await;
    /// assert_eq!(result, Ok(42));
    /// # });
    /// ```
    pub async fn run<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_when(label, operation, |e: &E| e.is_transient())
            .await
    }

    /// Run `operation`, retrying errors accepted by `is_retryable`
    pub async fn run_when<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{} succeeded after {} retries", label, retries);
                    }
                    return Ok(value);
                }
                Err(e) if retries < self.max_retries && is_retryable(&e) => {
                    retries += 1;
                    let delay = self.delay(retries);
                    warn!(
                        "{} failed (retry {}/{}): {}. Retrying in {}ms",
                        label,
                        retries,
                        self.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
