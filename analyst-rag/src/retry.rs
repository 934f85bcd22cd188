//! Resilient execution of provider calls.
//!
//! [`RetryPolicy`] runs an operation with a bounded number of attempts and
//! exponential backoff between them. Only errors whose
//! [`kind`](crate::RagError::kind) is retryable (transient network, rate
//! limiting, per-attempt timeouts) trigger another attempt; everything else
//! fails fast. The final error is always [`RagError::Attempts`], wrapping
//! the last concrete failure and recording how many attempts were made.
//!
//! Streams get the same treatment up to their first element. Once the
//! consumer has received output, a failure ends the stream with
//! [`RagError::StreamInterrupted`] instead of a retry, since replaying the
//! operation would duplicate what was already delivered.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{RagError, Result};

/// A boxed, pull-driven stream of fallible fragments.
///
/// Dropping the stream abandons the underlying operation.
pub type FragmentStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Bounded retry with exponential backoff.
///
/// Attempt `i` (zero-based) that fails with a retryable error is followed by
/// a wait of `base_delay * 2^i`, optionally capped by `max_delay`. There is no
/// wait after the final attempt.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use analyst_rag::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1));
/// let hits = policy.call("web_search", || search.search(query)).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` total attempts (at least one).
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
            attempt_timeout: None,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Cap every backoff wait at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Give each attempt a deadline. An attempt that exceeds it fails with
    /// [`RagError::Timeout`], which is retryable.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Total attempts made before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The wait after the first failed attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// The wait following failed attempt number `attempt_index` (zero-based).
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        let delay = self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` is invoked once per attempt and must build a fresh future
    /// each time.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Attempts`] wrapping the last failure.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            let outcome = self.run_attempt(operation, f()).await;
            attempts += 1;

            let failure = match outcome {
                Ok(value) => {
                    if attempts > 1 {
                        info!(operation, attempts, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if let Some(delay) = self.next_delay(operation, attempts, &failure) {
                tokio::time::sleep(delay).await;
            } else {
                return Err(RagError::Attempts {
                    operation: operation.to_string(),
                    attempts,
                    last: Box::new(failure),
                });
            }
        }
    }

    /// Open a stream with retries before its first element.
    ///
    /// `open` is invoked once per attempt. A failure while opening, or an
    /// error as the very first item, is retried under this policy. With an
    /// attempt timeout set, opening and receiving the first element share one
    /// deadline; missing it is a retryable [`RagError::Timeout`]. After the
    /// first element has been yielded, an error item ends the stream with
    /// [`RagError::StreamInterrupted`] carrying the delivered count. A stream
    /// that ends without output is a success.
    pub fn call_stream<T, F, Fut>(
        &self,
        operation: impl Into<String>,
        mut open: F,
    ) -> FragmentStream<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<FragmentStream<T>>> + Send + 'static,
    {
        let policy = self.clone();
        let operation = operation.into();

        Box::pin(async_stream::stream! {
            let mut attempts = 0;
            loop {
                let deadline = policy.attempt_timeout.map(|limit| (Instant::now() + limit, limit));
                let opened = match deadline {
                    Some((at, limit)) => match tokio::time::timeout_at(at, open()).await {
                        Ok(opened) => opened,
                        Err(_) => {
                            Err(RagError::Timeout { operation: operation.clone(), after: limit })
                        }
                    },
                    None => open().await,
                };
                attempts += 1;

                let failure = match opened {
                    Err(e) => e,
                    Ok(mut fragments) => {
                        let mut delivered = 0usize;
                        let early_failure = loop {
                            let next = match deadline {
                                Some((at, limit)) if delivered == 0 => {
                                    match tokio::time::timeout_at(at, fragments.next()).await {
                                        Ok(next) => next,
                                        Err(_) => {
                                            break Some(RagError::Timeout {
                                                operation: operation.clone(),
                                                after: limit,
                                            });
                                        }
                                    }
                                }
                                _ => fragments.next().await,
                            };
                            match next {
                                Some(Ok(item)) => {
                                    delivered += 1;
                                    yield Ok(item);
                                }
                                Some(Err(e)) if delivered == 0 => break Some(e),
                                Some(Err(e)) => {
                                    warn!(
                                        operation = %operation,
                                        delivered,
                                        error = %e,
                                        "stream interrupted"
                                    );
                                    yield Err(RagError::StreamInterrupted {
                                        operation: operation.clone(),
                                        delivered,
                                        last: Box::new(e),
                                    });
                                    break None;
                                }
                                None => {
                                    debug!(operation = %operation, delivered, "stream completed");
                                    break None;
                                }
                            }
                        };
                        match early_failure {
                            Some(e) => e,
                            None => return,
                        }
                    }
                };

                match policy.next_delay(&operation, attempts, &failure) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => {
                        yield Err(RagError::Attempts {
                            operation: operation.clone(),
                            attempts,
                            last: Box::new(failure),
                        });
                        return;
                    }
                }
            }
        })
    }

    async fn run_attempt<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(RagError::Timeout { operation: operation.to_string(), after: limit })
            }),
            None => fut.await,
        }
    }

    /// Decide whether to retry after `attempts` attempts ending in `failure`.
    fn next_delay(&self, operation: &str, attempts: u32, failure: &RagError) -> Option<Duration> {
        if !failure.is_retryable() {
            error!(
                operation,
                attempts,
                kind = ?failure.kind(),
                error = %failure,
                "non-retryable failure"
            );
            return None;
        }
        if attempts >= self.max_attempts {
            error!(operation, attempts, error = %failure, "retries exhausted");
            return None;
        }

        let delay = self.delay_for(attempts - 1);
        warn!(
            operation,
            attempt = attempts,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "attempt failed, backing off"
        );
        Some(delay)
    }
}
