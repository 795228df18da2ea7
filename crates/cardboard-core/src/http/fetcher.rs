//! Retry/backoff state machine around a single remote request.
//!
//! Every request goes through [`ResilientFetcher::fetch`]. The loop reads
//! the response status and decides:
//!
//! - `202` (report queued): wait for `Retry-After` or an exponential
//!   default, then ask again.
//! - `429`: exponential backoff with jitter.
//! - `5xx`, network errors, unexpected statuses, unparsable bodies:
//!   exponential backoff.
//! - `401`/`403`: returned to the caller immediately. Re-login belongs to
//!   the session manager.
//! - other `2xx`: parse, pause for the pacing interval, return.
//!
//! After `max_attempts` the last per-attempt failure is surfaced inside
//! [`FetchError::ExhaustedRetries`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after every successful response.
    pub pacing: Duration,
    /// Upper bound of the random extra added to `pacing`.
    pub pacing_jitter: Duration,
    pub queued_base: Duration,
    pub rate_limit_base: Duration,
    pub error_base: Duration,
    pub max_backoff: Duration,
    /// Fractional jitter (0.0..=1.0) applied to rate-limit backoff.
    pub backoff_jitter: f64,
    /// Overall budget for one `fetch` call, sleeps included.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            pacing: Duration::from_secs(2),
            pacing_jitter: Duration::from_millis(500),
            queued_base: Duration::from_secs(2),
            rate_limit_base: Duration::from_secs(5),
            error_base: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_jitter: 0.25,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Same schedule without randomness, for reproducible timing.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.pacing_jitter = Duration::ZERO;
        self.backoff_jitter = 0.0;
        self
    }

    fn exponential(&self, base: Duration, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(self.max_backoff)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.backoff_jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = self.backoff_jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        delay.mul_f64(factor).min(self.max_backoff)
    }

    fn pacing_delay(&self) -> Duration {
        let jitter_ms = self.pacing_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.pacing;
        }
        self.pacing + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    fn delay_for(
        &self,
        failure: &AttemptFailure,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Duration {
        match failure {
            AttemptFailure::Queued => retry_after.map_or_else(
                || self.exponential(self.queued_base, attempt),
                |delay| delay.min(self.max_backoff),
            ),
            AttemptFailure::RateLimited => retry_after.map_or_else(
                || self.jittered(self.exponential(self.rate_limit_base, attempt)),
                |delay| delay.min(self.max_backoff),
            ),
            AttemptFailure::TransientNetwork(_)
            | AttemptFailure::Timeout(_)
            | AttemptFailure::ServerError(_)
            | AttemptFailure::UnexpectedStatus(_)
            | AttemptFailure::UnparsablePayload(_) => self.exponential(self.error_base, attempt),
        }
    }
}

/// Why a single attempt did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("attempt timed out: {0}")]
    Timeout(String),
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("report still queued (HTTP 202)")]
    Queued,
    #[error("server error (HTTP {0})")]
    ServerError(u16),
    #[error("unexpected response: {0}")]
    UnexpectedStatus(String),
    #[error("unparsable payload: {0}")]
    UnparsablePayload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    AuthRejected,
    ExhaustedRetries,
    MalformedPayload,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} exceeded its deadline after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },
    #[error("request to {url} was rejected with HTTP {status}")]
    AuthRejected { url: String, status: u16 },
    #[error("request to {url} failed after {attempts} attempts, last error: {last}")]
    ExhaustedRetries {
        url: String,
        attempts: u32,
        last: AttemptFailure,
    },
    #[error("malformed payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout { .. } => FetchErrorKind::Timeout,
            Self::AuthRejected { .. } => FetchErrorKind::AuthRejected,
            Self::ExhaustedRetries { .. } => FetchErrorKind::ExhaustedRetries,
            Self::MalformedPayload { .. } => FetchErrorKind::MalformedPayload,
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        self.kind() == FetchErrorKind::AuthRejected
    }
}

/// Outcome of a payload parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The body could not be read as XML/JSON at all; worth retrying.
    #[error("{0}")]
    Syntax(String),
    /// The body parsed but is not the expected document; never retried.
    #[error("{0}")]
    Shape(String),
}

#[derive(Clone)]
pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResilientFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn fetch<T, P>(&self, request: &HttpRequest, parse: P) -> Result<T, FetchError>
    where
        P: Fn(&str) -> Result<T, PayloadError>,
    {
        let url = request.display_url();
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure = AttemptFailure::Queued;

        for attempt in 1..=max_attempts {
            let (failure, retry_after) = match self.transport.execute(request.clone()).await {
                Err(error) => (transport_failure(error), None),
                Ok(response) => match classify(&url, &response, &parse)? {
                    Classified::Done(value) => {
                        sleep(self.policy.pacing_delay()).await;
                        return Ok(value);
                    }
                    Classified::Retry(failure) => (failure, retry_after_header(&response)),
                },
            };

            if attempt == max_attempts {
                tracing::warn!(url = %url, attempt, error = %failure, "Giving up on request");
                last_failure = failure;
                break;
            }

            let delay = self.policy.delay_for(&failure, attempt, retry_after);
            if let Some(deadline) = self.policy.deadline {
                let elapsed = started.elapsed();
                if elapsed + delay > deadline {
                    tracing::warn!(
                        url = %url,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Request deadline reached"
                    );
                    return Err(FetchError::Timeout { url, elapsed });
                }
            }

            match failure {
                AttemptFailure::Queued => tracing::debug!(
                    url = %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Report queued, polling again"
                ),
                _ => tracing::warn!(
                    url = %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "Request attempt failed, backing off"
                ),
            }
            last_failure = failure;
            sleep(delay).await;
        }

        Err(FetchError::ExhaustedRetries {
            url,
            attempts: max_attempts,
            last: last_failure,
        })
    }
}

enum Classified<T> {
    Done(T),
    Retry(AttemptFailure),
}

fn classify<T, P>(
    url: &str,
    response: &HttpResponse,
    parse: &P,
) -> Result<Classified<T>, FetchError>
where
    P: Fn(&str) -> Result<T, PayloadError>,
{
    let failure = match response.status {
        202 => AttemptFailure::Queued,
        401 | 403 => {
            return Err(FetchError::AuthRejected {
                url: url.to_string(),
                status: response.status,
            })
        }
        429 => AttemptFailure::RateLimited,
        200..=299 => match parse(&response.body) {
            Ok(value) => return Ok(Classified::Done(value)),
            Err(PayloadError::Shape(reason)) => {
                return Err(FetchError::MalformedPayload {
                    url: url.to_string(),
                    reason,
                })
            }
            Err(PayloadError::Syntax(reason)) => AttemptFailure::UnparsablePayload(reason),
        },
        status @ 500..=599 => AttemptFailure::ServerError(status),
        _ => AttemptFailure::UnexpectedStatus(response.summary()),
    };
    Ok(Classified::Retry(failure))
}

fn transport_failure(error: TransportError) -> AttemptFailure {
    if error.is_timeout() {
        AttemptFailure::Timeout(error.to_string())
    } else {
        AttemptFailure::TransientNetwork(error.to_string())
    }
}

fn retry_after_header(response: &HttpResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
