//! Shared HTTP plumbing for the upstream collaborators.
//!
//! The exporter talks to two HTTP systems (the enrichment endpoint and the
//! blob writer). Both get the same pooled client and the same bounded-retry
//! behaviour: transport failures and throttling/5xx statuses are retried
//! with exponential backoff, everything else is terminal on first response.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::error::ContentError;

/// User agent sent on every outbound request.
pub const USER_AGENT: &str = "UPP Content Exporter";

/// Header carrying the transaction id end to end.
pub const TRANSACTION_ID_HEADER: &str = "X-Request-Id";

/// Bounded-retry settings for upstream requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Disable retries entirely; the first outcome is terminal.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Pooled HTTP client with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> Result<Self, ContentError> {
        let inner = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(128)
            .build()?;
        Ok(Self { inner, retry })
    }

    /// Start building a request; callers add headers and bodies.
    pub fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.inner.request(method, url)
    }

    /// Send a request, retrying transport failures and retryable statuses.
    ///
    /// The final response is returned whatever its status; mapping non-2xx
    /// codes onto errors is the caller's business. Requests with
    /// non-cloneable bodies are sent exactly once.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, ContentError> {
        let mut attempt = 0u32;
        let mut backoff = self.retry.initial_backoff;

        loop {
            let this_try = match request.try_clone() {
                Some(cloned) => cloned,
                None => return Ok(request.send().await?),
            };

            match this_try.send().await {
                Ok(response)
                    if retryable_status(response.status()) && attempt < self.retry.max_retries =>
                {
                    warn!(
                        status = response.status().as_u16(),
                        attempt, "retrying upstream request"
                    );
                }
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.retry.max_retries => {
                    warn!(error = %err, attempt, "retrying upstream request after transport error");
                }
                Err(err) => return Err(err.into()),
            }

            attempt += 1;
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.retry.max_backoff);
        }
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
