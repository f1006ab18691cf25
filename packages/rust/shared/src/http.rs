//! Retrying request helper shared by the provider and spreadsheet clients.
//!
//! Whether a failed request may go out again depends on the request, not the
//! client: a status poll can be repeated freely, an actor start cannot. Callers
//! say which with [`Replay`].

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::error::{LeadScoutError, Result};

/// Longest `Retry-After` we are willing to sleep for.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// How often and how patiently to retry a request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that sends each request exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`: doubles from the initial delay up to the cap.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// What a request is allowed to repeat after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Reads and idempotent writes. Retried on 408, 429, 5xx and transport errors.
    Idempotent,
    /// Requests with a side effect on the server. Retried only when the
    /// connection was never established, so the server cannot have seen it.
    ConnectOnly,
}

impl Replay {
    fn on_status(self, status: StatusCode) -> bool {
        self == Self::Idempotent
            && (status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT
                || status.is_server_error())
    }

    fn on_error(self, err: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => err.is_connect() || err.is_timeout(),
            Self::ConnectOnly => err.is_connect(),
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Send `request`, repeating it as far as `replay` allows.
///
/// The final response is returned whatever its status; callers decide what a
/// non-success status means for them. A body that cannot be cloned is sent once.
pub async fn send_with_retry(
    request: RequestBuilder,
    policy: &RetryPolicy,
    replay: Replay,
) -> Result<Response> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..attempts {
        let Some(cloned) = request.try_clone() else {
            break;
        };

        match cloned.send().await {
            Ok(response) if replay.on_status(response.status()) => {
                let status = response.status();
                let delay = retry_after(&response).unwrap_or_else(|| policy.backoff(attempt));
                warn!(attempt, attempts, %status, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(err) if replay.on_error(&err) => {
                let delay = policy.backoff(attempt);
                warn!(attempt, attempts, error = %err, ?delay, "retrying after transport error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(LeadScoutError::Network(err.to_string())),
        }
    }

    request
        .send()
        .await
        .map_err(|e| LeadScoutError::Network(e.to_string()))
}
