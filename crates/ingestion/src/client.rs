//! Rate-limited HTTP client for the YouTube Data API

use crate::rate_limit::SlidingWindowLimiter;
use crate::{IngestionError, Result};
use fanbase_core::retry::{retry_with_backoff, RetryPolicy};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for `RateLimitedClient`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// HTTP client that spends one limiter slot per attempt and retries
/// transient failures with a fixed delay
#[derive(Clone)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: Arc<SlidingWindowLimiter>,
    retry_policy: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig, limiter: Arc<SlidingWindowLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IngestionError::ConfigError(format!("HTTP client: {}", e)))?;

        Url::parse(&config.base_url).map_err(|e| {
            IngestionError::ConfigError(format!("Invalid API base URL {}: {}", config.base_url, e))
        })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            limiter,
            retry_policy: RetryPolicy::fixed(config.max_retries, config.retry_delay_ms),
        })
    }

    /// GET `endpoint` with query `params` and decode the JSON body
    ///
    /// Transient failures are retried up to the configured maximum; the last
    /// error is returned once retries run out.
    pub async fn fetch(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint_url(endpoint)?;

        retry_with_backoff(
            endpoint,
            || self.dispatch(&url, endpoint, params),
            &self.retry_policy,
            IngestionError::is_transient,
        )
        .await
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| IngestionError::permanent(endpoint, e.to_string()))
    }

    async fn dispatch(&self, url: &Url, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        self.limiter.acquire().await;
        debug!(endpoint, "Dispatching API request");

        let mut request = self.http.get(url.clone()).query(params);
        if !self.api_key.is_empty() {
            request = request.query(&[("key", self.api_key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_send_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, truncate(&body, 200));

            return if is_transient_status(status) {
                warn!(endpoint, status = status.as_u16(), "Transient API failure");
                Err(IngestionError::transient(endpoint, message))
            } else {
                warn!(endpoint, status = status.as_u16(), "API rejected request");
                Err(IngestionError::permanent(endpoint, message))
            };
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IngestionError::transient(endpoint, e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| {
            IngestionError::permanent(endpoint, format!("Malformed JSON response: {}", e))
        })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_send_error(endpoint: &str, err: reqwest::Error) -> IngestionError {
    if err.is_builder() {
        IngestionError::permanent(endpoint, err.to_string())
    } else {
        // timeouts, refused connections and resets
        IngestionError::transient(endpoint, err.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 200), "short");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(1),
            max_retries: 0,
            retry_delay_ms: 0,
        };
        let limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_secs(1)));
        assert!(matches!(
            RateLimitedClient::new(config, limiter),
            Err(IngestionError::ConfigError(_))
        ));
    }
}
