//! Retry with exponential back-off and transport-error classification.
//!
//! The classifier decides from error attributes alone; callers that want
//! different semantics set the explicit `retryable` hint on their error.

use std::future::Future;
use std::time::Duration;

/// Errors that want to participate in retry expose their transport
/// attributes through this trait.
pub trait RetryClassify {
    /// Explicit override; honored when present.
    fn retryable_hint(&self) -> Option<bool> { None }
    /// OS / transport error code, e.g. `ECONNRESET`.
    fn code(&self) -> Option<&str> { None }
    /// HTTP status, when the failure came from an HTTP response.
    fn status(&self) -> Option<u16> { None }
    /// Server-provided wait hint (rate limiting).
    fn retry_after_ms(&self) -> Option<u64> { None }
    /// Human-readable message, used as a last-resort heuristic.
    fn message(&self) -> &str;
}

const RETRYABLE_CODES: &[&str] = &["ECONNRESET", "ETIMEDOUT", "ECONNREFUSED", "EPIPE", "ENOTFOUND"];
const RETRYABLE_STATUS: &[u16] = &[429, 500, 502, 503, 504];
const FATAL_STATUS:     &[u16] = &[400, 401, 403, 404, 422];

/// Classification rules, in order. The fatal status set takes precedence
/// over the retryable one.
pub fn is_retryable<E: RetryClassify>(err: &E) -> bool {
    if let Some(hint) = err.retryable_hint() {
        return hint;
    }
    if let Some(status) = err.status() {
        if FATAL_STATUS.contains(&status) {
            return false;
        }
        if RETRYABLE_STATUS.contains(&status) {
            return true;
        }
    }
    if let Some(code) = err.code() {
        if RETRYABLE_CODES.contains(&code) {
            return true;
        }
    }
    let msg = err.message().to_lowercase();
    msg.contains("timeout") || msg.contains("network")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt; total attempts are
    /// `max_retries + 1`.
    pub max_retries:      u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms:     u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, initial_delay_ms: 1_000, max_delay_ms: 30_000 }
    }
}

impl RetryPolicy {
    /// Back-off for the 0-based `attempt`: `initial * 2^attempt`, capped at
    /// `max_delay_ms`. A rate-limit `retry_after` hint replaces the
    /// exponential term but is still capped.
    pub fn backoff_delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        let ms = match retry_after_ms {
            Some(hint) => hint.min(self.max_delay_ms),
            None => {
                let exp = self.initial_delay_ms.saturating_mul(1u64 << attempt.min(32));
                exp.min(self.max_delay_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

/// Call `f` until it succeeds, the error classifies non-retryable, or
/// attempts are exhausted (`max_retries + 1` total). The final error is
/// propagated unchanged.
pub async fn retry<T, E, F, Fut>(
    policy:   &RetryPolicy,
    mut f:    F,
    mut on_retry: Option<&mut (dyn FnMut(u32, Duration, &E) + Send)>,
) -> Result<T, E>
where
    E:   RetryClassify,
    F:   FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.backoff_delay(attempt, err.retry_after_ms());
                tracing::warn!(
                    attempt = attempt + 1,
                    max     = policy.max_retries,
                    wait_ms = delay.as_millis() as u64,
                    error   = %err.message(),
                    "transient error — retrying"
                );
                if let Some(cb) = on_retry.as_deref_mut() {
                    cb(attempt, delay, &err);
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
