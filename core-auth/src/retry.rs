//! Retry policy for transient HTTP failures.
//!
//! Token-endpoint and resource calls are retried on request timeouts and on
//! the statuses in [`RETRYABLE_STATUSES`]. The delay before retry `n`
//! (1-based) is `2^n - 1` seconds, so the default five retries wait
//! 1, 3, 7, 15 and 31 seconds. Every other status is final and handed back to
//! the caller untouched.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_async::sync::CancellationToken;
use core_runtime::config::DEFAULT_MAX_RETRIES;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Request Timeout, Internal Server Error, Service Unavailable, Gateway Timeout.
pub const RETRYABLE_STATUSES: [u16; 4] = [408, 500, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Delay before the `retry`-th retry (1-based): `2^retry - 1` seconds.
    ///
    /// ```
    /// use core_auth::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for(5), Duration::from_secs(31));
    /// ```
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.min(63);
        Duration::from_secs((1u64 << exponent) - 1)
    }

    pub fn is_retryable(&self, error: &BridgeError) -> bool {
        match error {
            BridgeError::Timeout(_) => true,
            BridgeError::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// `operation` receives the 1-based attempt number. Backoff sleeps end
    /// early with [`BridgeError::Cancelled`] when `cancel` fires.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> BridgeResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt <= self.max_retries && self.is_retryable(&error) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "Transient HTTP failure, retrying"
                    );
                    core_async::cancellable_sleep(cancel, delay)
                        .await
                        .map_err(|_| BridgeError::Cancelled)?;
                    attempt += 1;
                }
                Err(error) => {
                    if attempt > 1 {
                        debug!(attempts = attempt, error = %error, "Giving up after retries");
                    }
                    return Err(error);
                }
            }
        }
    }
}

/// [`HttpClient`] decorator that applies a [`RetryPolicy`].
///
/// A response with a retryable status is turned into
/// [`BridgeError::HttpStatus`] so the policy can see it; if the budget runs
/// out that error is returned. Other responses, successful or not, are
/// returned as `Ok`.
pub struct RetryingHttpClient {
    inner: Arc<dyn HttpClient>,
    policy: RetryPolicy,
}

impl RetryingHttpClient {
    pub fn new(inner: Arc<dyn HttpClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn attempt(&self, request: HttpRequest, cancel: &CancellationToken) -> BridgeResult<HttpResponse> {
        let response = self.inner.execute_cancellable(request, cancel).await?;
        if is_retryable_status(response.status) {
            return Err(BridgeError::HttpStatus {
                status: response.status,
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpClient for RetryingHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.execute_cancellable(request, &CancellationToken::new()).await
    }

    async fn execute_cancellable(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> BridgeResult<HttpResponse> {
        self.policy
            .execute(cancel, |attempt| {
                debug!(attempt, method = request.method.as_str(), "Sending HTTP request");
                self.attempt(request.clone(), cancel)
            })
            .await
    }
}
