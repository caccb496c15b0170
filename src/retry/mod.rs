mod policy;

pub use policy::RetryPolicy;

use std::future::Future;
use std::time::Duration;

/// Classification of transient retry causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Connect,
    Timeout,
    ServerError,
    RequestTimeout,
}

impl RetryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::RequestTimeout => "request_timeout",
        }
    }
}

/// Retry decision for one attempt result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        reason: RetryReason,
        retry_after: Option<Duration>,
    },
    DoNotRetry,
}

/// Metadata for one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay: Duration,
    pub reason: RetryReason,
}

/// Parse `Retry-After` header value as a delay.
///
/// Supports:
/// - Delta-seconds (`Retry-After: 5`)
/// - HTTP-date (`Retry-After: Wed, 21 Oct 2015 07:28:00 GMT`)
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    if let Ok(when) = httpdate::parse_http_date(raw) {
        let now = std::time::SystemTime::now();
        if let Ok(delay) = when.duration_since(now) {
            return Some(delay);
        }
        return Some(Duration::from_secs(0));
    }

    None
}

/// Classify reqwest result into retry/no-retry.
///
/// Deliberately does not retry `429 Too Many Requests`: a rate limit is an
/// account-level signal (§7 `UpstreamRateLimited`), handled by the caller
/// re-selecting a different account, not by backing off and hammering the
/// same one.
pub fn classify_reqwest_result(
    result: &std::result::Result<reqwest::Response, reqwest::Error>,
) -> RetryDecision {
    match result {
        Ok(resp) => {
            let status = resp.status();
            if status == reqwest::StatusCode::REQUEST_TIMEOUT {
                return RetryDecision::Retry {
                    reason: RetryReason::RequestTimeout,
                    retry_after: parse_retry_after(resp.headers()),
                };
            }
            if status.is_server_error() {
                return RetryDecision::Retry {
                    reason: RetryReason::ServerError,
                    retry_after: parse_retry_after(resp.headers()),
                };
            }
            RetryDecision::DoNotRetry
        }
        Err(err) => {
            if err.is_timeout() {
                return RetryDecision::Retry {
                    reason: RetryReason::Timeout,
                    retry_after: None,
                };
            }
            if err.is_connect() || err.is_request() {
                return RetryDecision::Retry {
                    reason: RetryReason::Connect,
                    retry_after: None,
                };
            }
            RetryDecision::DoNotRetry
        }
    }
}

/// Retry an async operation with backoff according to `policy`.
///
/// - `operation(attempt)` is called with a 1-based attempt number.
/// - `classify(result)` decides whether to retry.
/// - `on_retry(info)` is called right before sleeping.
pub async fn retry_with_backoff<T, E, Op, Fut, Classify, OnRetry>(
    policy: &RetryPolicy,
    mut operation: Op,
    mut classify: Classify,
    mut on_retry: OnRetry,
) -> std::result::Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    Classify: FnMut(&std::result::Result<T, E>) -> RetryDecision,
    OnRetry: FnMut(RetryAttempt),
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let result = operation(attempt).await;
        let decision = if attempt < max_attempts {
            classify(&result)
        } else {
            RetryDecision::DoNotRetry
        };

        match (decision, result) {
            (RetryDecision::Retry { reason, retry_after }, Err(err)) => {
                let backoff = policy.backoff_delay(attempt);
                let base_delay = retry_after.unwrap_or(backoff);
                let delay = policy.with_jitter(base_delay);
                on_retry(RetryAttempt {
                    attempt,
                    delay,
                    reason,
                });
                tokio::time::sleep(delay).await;
                let _ = err;
            }
            (RetryDecision::Retry { reason, retry_after }, Ok(_)) => {
                let backoff = policy.backoff_delay(attempt);
                let base_delay = retry_after.unwrap_or(backoff);
                let delay = policy.with_jitter(base_delay);
                on_retry(RetryAttempt {
                    attempt,
                    delay,
                    reason,
                });
                tokio::time::sleep(delay).await;
            }
            (_, final_result) => return final_result,
        }
    }

    unreachable!("retry loop always returns");
}
