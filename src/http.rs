//! JSON request loop shared by the ConceptNet client and the model backend.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: usize, base_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_backoff: Duration::from_millis(base_backoff_ms),
        }
    }

    /// Exponential: `base * 2^retry`.
    pub fn backoff(&self, retry: usize) -> Duration {
        self.base_backoff.saturating_mul(1u32 << retry.min(16))
    }
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT || status.is_server_error()
}

/// Sends the request built by `build` and decodes a JSON body. Transport
/// errors and retryable statuses are retried per `policy`; other statuses
/// fail at once.
pub async fn send_json<T, F>(policy: RetryPolicy, service: &str, build: F) -> Result<T, HttpError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut retry = 0;
    loop {
        let err = match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let bytes = resp.bytes().await?;
                    return Ok(serde_json::from_slice(&bytes)?);
                }
                let body = resp.text().await.unwrap_or_default();
                let err = HttpError::Status { status, body };
                if !is_retryable(status) {
                    return Err(err);
                }
                err
            }
            Err(e) => HttpError::Request(e),
        };

        if retry >= policy.max_retries {
            return Err(err);
        }
        warn!(service, retry, error = %err, "request failed, retrying");
        sleep(policy.backoff(retry)).await;
        retry += 1;
    }
}
