//! Error → HTTP response conversion.
//!
//! Body shape: `{"error": {"code": <stable code>, "message": <text>, ...details}}`.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::runtime::RateLimitStatus;
use crate::types::Error;

pub const RETRY_AFTER: &str = "retry-after";
pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Whole seconds, rounded up.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ceil_secs(secs: f64) -> u64 {
    secs.max(0.0).ceil() as u64
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// `X-RateLimit-*` headers for an admitted call.
pub fn rate_limit_headers(status: &RateLimitStatus) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, RATE_LIMIT_LIMIT, status.limit);
    insert_header(&mut headers, RATE_LIMIT_REMAINING, status.remaining);
    insert_header(&mut headers, RATE_LIMIT_RESET, ceil_secs(status.reset_after_secs));
    headers
}

/// Standard error body with extra detail fields merged in.
pub fn error_body(code: &str, message: &str, details: Map<String, Value>) -> Value {
    let mut error = Map::new();
    error.insert("code".to_string(), json!(code));
    error.insert("message".to_string(), json!(message));
    error.extend(details);
    json!({ "error": error })
}

fn details(err: &Error) -> Map<String, Value> {
    let value = match err {
        Error::ArgsValidation {
            plugin,
            tool,
            errors,
        } => json!({"plugin": plugin, "tool": tool, "errors": errors}),
        Error::UnknownPluginOrTool { plugin, tool } => json!({"plugin": plugin, "tool": tool}),
        Error::ApiVersionUnsupported { plugins } => json!({"plugins": plugins}),
        Error::RateLimited(rejection) => json!({
            "scope": rejection.scope,
            "limit": rejection.limit,
            "remaining": rejection.remaining,
            "reset_after": ceil_secs(rejection.reset_after_secs),
            "retry_after": ceil_secs(rejection.retry_after_secs).max(1),
        }),
        Error::Upstream(upstream) => json!({
            "upstream_url": upstream.upstream_url,
            "upstream_status": upstream.status,
        }),
        Error::SinkRejected { status, .. } => json!({"sink_status": status}),
        Error::Manifest { path, .. } => json!({"path": path.display().to_string()}),
        _ => json!({}),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request_failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request_rejected");
        }

        let mut headers = HeaderMap::new();
        if let Error::RateLimited(rejection) = &self {
            insert_header(&mut headers, RETRY_AFTER, ceil_secs(rejection.retry_after_secs).max(1));
            insert_header(&mut headers, RATE_LIMIT_LIMIT, rejection.limit);
            insert_header(&mut headers, RATE_LIMIT_REMAINING, rejection.remaining);
            insert_header(&mut headers, RATE_LIMIT_RESET, ceil_secs(rejection.reset_after_secs));
        }

        let body = error_body(self.code(), &self.to_string(), details(&self));
        (status, headers, Json(body)).into_response()
    }
}

/// Response for a job-level failure, which is not an [`Error`].
pub fn job_error_response(
    status: StatusCode,
    headers: HeaderMap,
    code: &str,
    message: &str,
    details: Map<String, Value>,
) -> Response {
    (status, headers, Json(error_body(code, message, details))).into_response()
}
