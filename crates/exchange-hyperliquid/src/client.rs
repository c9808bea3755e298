//! Hyperliquid REST client with pacing and a bounded retry policy.
//!
//! Every attempt goes through the shared [`RateLimiter`]. Failures are classified once:
//! - 429: retried after `attempt * retry_delay`, then [`GatewayError::RateLimitExceeded`];
//! - timeouts, connection errors and 5xx: retried after `retry_delay`;
//! - 400/422 and bodies that do not match the expected schema: [`GatewayError::MalformedRequest`]
//!   immediately;
//! - any other status: [`GatewayError::Http`] immediately.

use crate::models::{ExchangeResponse, InfoRequest};
use crate::rate_limiter::RateLimiter;
use anyhow::{Context, Result};
use funding_arb_core::config::ExchangeConfig;
use funding_arb_core::error::GatewayError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// A failed attempt that may succeed if repeated.
enum Transient {
    RateLimited,
    Timeout,
    Transport(String),
    Server { status: u16, body: String },
}

impl Transient {
    fn into_error(self, attempts: u32) -> GatewayError {
        match self {
            Self::RateLimited => GatewayError::RateLimitExceeded { attempts },
            Self::Timeout => GatewayError::Timeout { attempts },
            Self::Transport(message) => GatewayError::Transport(message),
            Self::Server { status, body } => GatewayError::Http { status, body },
        }
    }
}

pub struct HyperliquidClient {
    http: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl HyperliquidClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(policy.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter,
            policy,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ExchangeConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        Self::new(config.api_url.clone(), limiter, RetryPolicy::from_config(config))
    }

    /// `POST /info` with a typed request and response.
    ///
    /// # Errors
    ///
    /// Returns the classified failure once the retry policy is exhausted.
    pub async fn info<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T, GatewayError> {
        self.post("/info", request).await
    }

    /// `POST /exchange` with an already signed body.
    ///
    /// # Errors
    ///
    /// Returns the classified failure once the retry policy is exhausted.
    pub async fn exchange(&self, body: &serde_json::Value) -> Result<ExchangeResponse, GatewayError> {
        self.post("/exchange", body).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            debug!(url = %url, attempt, "POST");

            let failure = match self.http.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.bytes().await {
                            Ok(bytes) => {
                                return serde_json::from_slice(&bytes).map_err(|e| {
                                    GatewayError::MalformedRequest(format!(
                                        "unexpected response schema from {path}: {e}"
                                    ))
                                });
                            }
                            Err(e) if e.is_timeout() => Transient::Timeout,
                            Err(e) => Transient::Transport(e.to_string()),
                        }
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        match status {
                            StatusCode::TOO_MANY_REQUESTS => Transient::RateLimited,
                            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                                return Err(GatewayError::MalformedRequest(format!(
                                    "{status}: {text}"
                                )));
                            }
                            s if s.is_server_error() => Transient::Server {
                                status: s.as_u16(),
                                body: text,
                            },
                            s => {
                                return Err(GatewayError::Http {
                                    status: s.as_u16(),
                                    body: text,
                                });
                            }
                        }
                    }
                }
                Err(e) if e.is_timeout() => Transient::Timeout,
                Err(e) if e.is_builder() => {
                    return Err(GatewayError::MalformedRequest(e.to_string()));
                }
                Err(e) => Transient::Transport(e.to_string()),
            };

            if attempt >= self.policy.max_retries {
                let err = failure.into_error(attempt);
                warn!(url = %url, attempts = attempt, error = %err, "Retry budget exhausted");
                return Err(err);
            }

            let delay = match failure {
                Transient::RateLimited => self.policy.retry_delay * attempt,
                _ => self.policy.retry_delay,
            };
            warn!(
                url = %url,
                attempt,
                delay_ms = delay.as_millis(),
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
