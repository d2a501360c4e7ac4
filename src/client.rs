//! HTTP client for the search API.
//!
//! Every request attempt is classified into an explicit [`FetchOutcome`]
//! (success, retryable failure, fatal failure) and the retry loop pattern
//! matches on it instead of unwinding through exceptions. Transient
//! failures back off exponentially with bounded random jitter; a fixed polite
//! delay is applied after every attempt, success or failure, to respect the
//! provider's implicit rate limit.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::warn;

use crate::config::ApiConfig;
use crate::model::{SearchRequest, SearchResponse};
use crate::traits::{AssetFetcher, FetchError, SearchApi};

// ============================================================================
// Retry Policy
// ============================================================================

/// Exponential backoff settings for transient request failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per request before giving up
    pub max_attempts: u32,

    /// Base backoff unit; attempt `n` sleeps `base_delay * 2^n` plus jitter
    pub base_delay: Duration,

    /// Upper bound of the uniform random jitter added to each backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the given failed attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        exponential + random_jitter(self.max_jitter)
    }
}

/// Uniform random duration in `[0, max)`; zero when `max` is zero.
pub(crate) fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::rng().random_range(0.0..max.as_secs_f64()))
}

// ============================================================================
// Outcome Classification
// ============================================================================

/// Classified result of one request attempt.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// Parsed response body
    Success(T),

    /// Transient failure (network error, server error, timeout); eligible
    /// for backoff and retry
    Retryable(String),

    /// Non-retryable failure; surfaced to the caller immediately
    Fatal(FetchError),
}

/// Whether an HTTP status is a non-retryable client error.
///
/// Client errors mean the request itself is malformed and retrying cannot
/// help. Request-timeout and too-many-requests are transient despite their
/// 4xx class.
pub(crate) fn is_fatal_status(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

/// Runs `attempt_fn` until success, a fatal outcome, or retry exhaustion.
///
/// The polite delay is applied after every attempt so the rate limit holds on
/// the happy path too; backoff sleeps come on top of it between retries.
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    polite_delay: Duration,
    mut attempt_fn: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchOutcome<T>>,
{
    let mut attempt = 0;
    loop {
        let outcome = attempt_fn().await;
        sleep(polite_delay).await;

        match outcome {
            FetchOutcome::Success(body) => return Ok(body),
            FetchOutcome::Fatal(err) => return Err(err),
            FetchOutcome::Retryable(cause) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last_error: cause,
                    });
                }
                let delay = policy.backoff_delay(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    cause = %cause,
                    "request failed, backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

// ============================================================================
// Search Client
// ============================================================================

/// `reqwest`-backed implementation of [`SearchApi`] and [`AssetFetcher`].
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl SearchClient {
    /// Builds a client with the per-request timeout from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: ApiConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn attempt_search(&self, request: &SearchRequest) -> FetchOutcome<SearchResponse> {
        let result = self
            .http
            .get(&self.config.api_url)
            .query(&request.query_params(&self.config.api_key))
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.json::<SearchResponse>().await {
                        Ok(body) => FetchOutcome::Success(body),
                        Err(e) => FetchOutcome::Retryable(format!("invalid response body: {e}")),
                    }
                } else if is_fatal_status(status) {
                    let detail = response.text().await.unwrap_or_default();
                    FetchOutcome::Fatal(FetchError::BadRequest {
                        detail: format!("{status}: {detail}"),
                    })
                } else {
                    FetchOutcome::Retryable(format!("HTTP status {status}"))
                }
            }
            Err(e) => FetchOutcome::Retryable(e.to_string()),
        }
    }
}

#[async_trait]
impl SearchApi for SearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchError> {
        run_with_retry(&self.config.retry, self.config.polite_delay, || {
            self.attempt_search(request)
        })
        .await
    }
}

#[async_trait]
impl AssetFetcher for SearchClient {
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(url)
            .timeout(self.config.asset_timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transfer(e.to_string()))?
            .error_for_status()
            .map_err(|e| FetchError::Transfer(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transfer(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_fatal_status_classification() {
        assert!(is_fatal_status(StatusCode::BAD_REQUEST));
        assert!(is_fatal_status(StatusCode::UNAUTHORIZED));
        assert!(is_fatal_status(StatusCode::NOT_FOUND));

        assert!(!is_fatal_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_fatal_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_fatal_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_fatal_status(StatusCode::BAD_GATEWAY));
        assert!(!is_fatal_status(StatusCode::OK));
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let max = Duration::from_millis(500);
        for _ in 0..100 {
            assert!(random_jitter(max) < max);
        }
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&instant_policy(5), Duration::ZERO, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    FetchOutcome::Retryable("connection reset".to_string())
                } else {
                    FetchOutcome::Success(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&instant_policy(5), Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { FetchOutcome::Retryable("server error".to_string()) }
        })
        .await;

        match result {
            Err(FetchError::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error, "server error");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fatal_outcome_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&instant_policy(5), Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                FetchOutcome::Fatal(FetchError::BadRequest {
                    detail: "bad query".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::BadRequest { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
