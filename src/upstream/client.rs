//! Resilient outbound HTTP client.
//!
//! Read-style methods get bounded retries with exponential backoff; every
//! other method gets exactly one attempt. Only transport failures are
//! retried: a response with an error status is returned as-is.

use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::error::{TransportError, UpstreamError};
use super::retry::RetryPolicy;
use super::transport::{HttpResponse, HttpTransport, OutboundRequest, ReqwestTransport};
use crate::types::{HttpClientConfig, RequestId, Result};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub json: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub request_id: Option<RequestId>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

#[derive(Clone)]
pub struct ResilientHttpClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    default_timeout: Duration,
}

impl std::fmt::Debug for ResilientHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientHttpClient")
            .field("retry", &self.retry)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl ResilientHttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy, default_timeout: Duration) -> Self {
        Self {
            transport,
            retry,
            default_timeout,
        }
    }

    /// reqwest-backed client configured from `config`.
    pub fn from_config(config: &HttpClientConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(ReqwestTransport::new()?),
            RetryPolicy::from_config(config),
            config.default_timeout,
        ))
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send with retries. Exhausting the attempts returns the last transport
    /// error.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let mut headers = options.headers;
        if let Some(request_id) = &options.request_id {
            headers.push(("X-Request-Id".to_string(), request_id.to_string()));
        }
        let request = OutboundRequest {
            method,
            url: url.to_string(),
            headers,
            json: options.json,
            timeout: options.timeout.unwrap_or(self.default_timeout),
        };
        let request_id = options
            .request_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        let max_attempts = self.retry.attempts_for(&request.method);
        let mut attempt = 1;
        loop {
            match self.transport.send(&request).await {
                Ok(response) => {
                    tracing::debug!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        attempt,
                        request_id = %request_id,
                        "upstream_response"
                    );
                    return Ok(response);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        request_id = %request_id,
                        "upstream_retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempts = attempt,
                        error = %err,
                        request_id = %request_id,
                        "upstream_failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Send and decode a JSON response, mapping every failure (transport or
    /// non-success status) to an [`UpstreamError`]. A non-JSON body comes back
    /// as a JSON string; an empty body as `null`.
    pub async fn call_json(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> std::result::Result<Value, UpstreamError> {
        let response = self
            .request(method, url, options)
            .await
            .map_err(|e| UpstreamError::from_transport(&e, url))?;
        if !response.is_success() {
            return Err(UpstreamError::from_status(response.status, &response.body, url));
        }
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(response
            .json()
            .unwrap_or_else(|_| Value::String(response.text())))
    }
}
