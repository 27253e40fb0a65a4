//! Per-provider request gate: rate limiting, bounded retries, backoff.
//!
//! Every provider task owns one [`RequestGate`]. The gate throttles request
//! starts to the configured rate, retries transient failures with
//! exponential backoff plus jitter, and races every wait against the
//! run-scoped cancellation token so a run that hit its limit stops without
//! dangling sleeps.

use crate::error::{EngineError, Result};
use crate::types::RequestSpec;
use governor::{Quota, RateLimiter};
use rand::Rng;
use reqwest::Client;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Retry budget shared by network errors and rate-limit responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per page, first try included
    pub max_attempts: u32,
    /// Backoff base; attempt n sleeps `base * 2^n` plus jitter
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct RequestGate {
    client: Client,
    limiter: DirectLimiter,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RequestGate {
    pub fn new(
        client: Client,
        requests_per_second: u32,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).ok_or_else(
            || EngineError::Config("requests_per_second must be greater than 0".to_string()),
        )?);
        Ok(Self {
            client,
            limiter: RateLimiter::direct(quota),
            policy,
            cancel,
        })
    }

    /// Execute `spec`, returning the response body on success.
    ///
    /// Retries HTTP 429, HTTP 5xx, and transport errors up to the policy's
    /// attempt budget. HTTP 401/403 is an immediate, non-retryable
    /// authentication rejection; any other non-success status is terminal
    /// for the page.
    pub async fn send(&self, provider: &'static str, spec: &RequestSpec) -> Result<String> {
        let mut last_err = EngineError::UpstreamStatus { provider, status: 0 };

        for attempt in 0..self.policy.max_attempts {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = self.limiter.until_ready() => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                result = self.execute(spec) => result,
            };
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(EngineError::AuthRejected {
                            provider,
                            status: status.as_u16(),
                        });
                    }
                    let err = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        EngineError::RateLimited { provider }
                    } else {
                        EngineError::UpstreamStatus {
                            provider,
                            status: status.as_u16(),
                        }
                    };
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = err;
                }
                Err(err) => last_err = EngineError::Http(err),
            }

            if attempt + 1 < self.policy.max_attempts {
                tracing::warn!(
                    provider,
                    attempt = attempt + 1,
                    error = %last_err,
                    "request failed, backing off"
                );
                if !self.backoff(attempt).await {
                    return Err(EngineError::Cancelled);
                }
            }
        }

        Err(last_err)
    }

    /// Sleep the backoff delay for `attempt`, racing cancellation.
    /// Returns false when the token fired first.
    pub async fn backoff(&self, attempt: u32) -> bool {
        let base = self.policy.base_delay * 2_u32.saturating_pow(attempt);
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 2);
        let delay = base + Duration::from_millis(jitter);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn execute(&self, spec: &RequestSpec) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut request = self.client.request(spec.method.clone(), spec.url.clone());
        for (name, value) in &spec.headers {
            request = request.header(*name, value);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        request.send().await
    }
}
