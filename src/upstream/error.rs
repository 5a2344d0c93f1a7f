//! Typed upstream failures.
//!
//! A [`TransportError`] means no HTTP response arrived; the retry loop works
//! on those. An [`UpstreamError`] is what callers see: the failure kind, the
//! status if one came back, and the URL that was called.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// Connection could not be established.
    Connect,
    /// Deadline elapsed before a response arrived.
    Timeout,
    /// Any other transport failure (reset, protocol error, body read).
    Transport,
    /// A response arrived with a non-success status.
    Status,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpstreamErrorKind::Connect => "connect",
            UpstreamErrorKind::Timeout => "timeout",
            UpstreamErrorKind::Transport => "transport",
            UpstreamErrorKind::Status => "status",
        };
        f.write_str(s)
    }
}

/// Failure before any HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failure: {message}")]
pub struct TransportError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Timeout, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if err.is_connect() {
            UpstreamErrorKind::Connect
        } else {
            UpstreamErrorKind::Transport
        };
        Self::new(kind, err.to_string())
    }
}

/// A failed outbound call as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("upstream {kind} error from {upstream_url}: {detail}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub detail: String,
    pub upstream_url: String,
}

impl UpstreamError {
    pub fn new(
        kind: UpstreamErrorKind,
        status: Option<u16>,
        detail: impl Into<String>,
        upstream_url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            detail: detail.into(),
            upstream_url: upstream_url.into(),
        }
    }

    pub fn from_transport(err: &TransportError, upstream_url: &str) -> Self {
        Self::new(err.kind, None, err.message.clone(), upstream_url)
    }

    /// Non-success response. The body (truncated) becomes the detail.
    pub fn from_status(status: u16, body: &[u8], upstream_url: &str) -> Self {
        const MAX_DETAIL: usize = 512;
        let text = String::from_utf8_lossy(body);
        let detail = if text.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            text.chars().take(MAX_DETAIL).collect()
        };
        Self::new(UpstreamErrorKind::Status, Some(status), detail, upstream_url)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == UpstreamErrorKind::Timeout
    }
}
