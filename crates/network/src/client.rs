//! HTTP client wrapper with resilience
//!
//! Reads (GET) are idempotent and go through the retry policy. Writes are
//! sent exactly once per call: whether a failed write is attempted again is
//! the caller's decision. Every request passes the circuit breaker.

use crate::error::{NetworkError, NetworkResult};
use fieldsync_resilience::{with_retry, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use log::{debug, warn};
use reqwest::{Client as ReqwestClient, Method, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Retry policy for GET requests
    pub retry_policy: Option<RetryPolicy>,
    /// Circuit breaker config
    pub circuit_breaker_config: Option<CircuitBreakerConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("fieldsync/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 5,
            retry_policy: Some(RetryPolicy::new(3).with_initial_delay(Duration::from_millis(200))),
            circuit_breaker_config: Some(CircuitBreakerConfig::new(5, Duration::from_secs(30))),
        }
    }
}

impl ClientConfig {
    /// Sets the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables GET retries
    pub fn without_retry(mut self) -> Self {
        self.retry_policy = None;
        self
    }

    /// Disables the circuit breaker
    pub fn without_circuit_breaker(mut self) -> Self {
        self.circuit_breaker_config = None;
        self
    }
}

/// HTTP client with resilience features
#[derive(Clone)]
pub struct Client {
    inner: ReqwestClient,
    config: ClientConfig,
    circuit_breaker: Option<CircuitBreaker>,
}

impl Client {
    /// Creates a new client with default configuration
    pub fn new() -> NetworkResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> NetworkResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(NetworkError::Http)?;

        let circuit_breaker = config
            .circuit_breaker_config
            .as_ref()
            .map(|cfg| CircuitBreaker::new(cfg.clone()));

        Ok(Self {
            inner: client,
            config,
            circuit_breaker,
        })
    }

    /// Returns the configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the circuit breaker, if enabled
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_ref()
    }

    /// GETs `url` with the query pairs and decodes the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> NetworkResult<T> {
        let url = parse_url(url)?;
        let policy = self
            .config
            .retry_policy
            .clone()
            .unwrap_or_else(RetryPolicy::none);

        let response = with_retry(&policy, NetworkError::is_retryable, move || {
            let request = self.inner.get(url.clone()).query(query);
            async move { self.send(request).await }
        })
        .await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| NetworkError::Decode(e.to_string()))
    }

    /// POSTs a JSON body once
    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> NetworkResult<u16> {
        self.write(Method::POST, url, Some(body)).await
    }

    /// PUTs a JSON body once
    pub async fn put_json(&self, url: &str, body: &serde_json::Value) -> NetworkResult<u16> {
        self.write(Method::PUT, url, Some(body)).await
    }

    /// Sends a DELETE once
    pub async fn delete(&self, url: &str) -> NetworkResult<u16> {
        self.write(Method::DELETE, url, None).await
    }

    /// Checks whether the host behind `url` answers at all
    ///
    /// Any HTTP response counts, whatever its status. The circuit breaker is
    /// bypassed so a probe can notice recovery while the breaker is open.
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.inner.head(url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }

    async fn write(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> NetworkResult<u16> {
        let url = parse_url(url)?;
        let mut request = self.inner.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.send(request).await?;
        Ok(response.status().as_u16())
    }

    /// Sends one request through the circuit breaker and maps non-2xx to errors
    async fn send(&self, request: reqwest::RequestBuilder) -> NetworkResult<Response> {
        if let Some(cb) = &self.circuit_breaker {
            cb.check()?;
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_failure();
                }
                return Err(NetworkError::Http(e));
            }
        };

        let status = response.status();

        // A 4xx still proves the server is up and answering
        if let Some(cb) = &self.circuit_breaker {
            if status.is_server_error() {
                cb.record_failure();
            } else {
                cb.record_success();
            }
        }

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        warn!("{} answered HTTP {}", url, status.as_u16());

        Err(NetworkError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn parse_url(url: &str) -> NetworkResult<Url> {
    Url::parse(url).map_err(|_| NetworkError::InvalidUrl(url.to_string()))
}

/// Appends percent-encoded path segments to `base`
///
/// A trailing slash on `base` is ignored, so `http://host/api/` and
/// `http://host/api` give the same result.
pub fn join_url(base: &str, segments: &[&str]) -> NetworkResult<String> {
    let mut url = parse_url(base)?;
    url.path_segments_mut()
        .map_err(|_| NetworkError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}
