//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Every variant carries a stable code that
//! clients can match on; the HTTP layer turns errors into responses.
//!
//! Execution failures and timeouts are not variants here: they are job state
//! (`runtime::JobError`), not errors returned to the gateway.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

use crate::runtime::rate_limiter::RateLimitRejection;
use crate::upstream::UpstreamError;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the plugin runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest file could not be parsed or failed structural checks.
    #[error("manifest error in {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// One or more loaded manifests declare an unsupported apiVersion.
    #[error("unsupported apiVersion in plugin(s): {}", plugins.join(", "))]
    ApiVersionUnsupported { plugins: Vec<String> },

    /// Invocation arguments do not satisfy the tool's argsSchema.
    #[error("invalid arguments for {plugin}/{tool}: {}", errors.join("; "))]
    ArgsValidation {
        plugin: String,
        tool: String,
        errors: Vec<String>,
    },

    /// No such plugin, or the plugin has no such tool.
    #[error("unknown plugin or tool: {plugin}/{tool}")]
    UnknownPluginOrTool { plugin: String, tool: String },

    /// Admission rejected by a token bucket (boxed to reduce Result size).
    #[error("rate limited: {0}")]
    RateLimited(Box<RateLimitRejection>),

    /// The external policy decision point denied the call.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Outbound call failed (boxed to reduce Result size).
    #[error("{0}")]
    Upstream(Box<UpstreamError>),

    /// The ingestion sink refused the payload (4xx); spilling would not help.
    #[error("ingestion sink rejected payload ({status}): {detail}")]
    SinkRejected { status: u16, detail: String },

    /// Validation errors on request shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid job state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable, client-visible error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Manifest { .. } => "MANIFEST_INVALID",
            Error::ApiVersionUnsupported { .. } => "API_VERSION_UNSUPPORTED",
            Error::ArgsValidation { .. } => "ARGS_VALIDATION_FAILED",
            Error::UnknownPluginOrTool { .. } => "UNKNOWN_PLUGIN_OR_TOOL",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::PolicyDenied(_) => "POLICY_DENIED",
            Error::Upstream(e) if e.is_timeout() => "UPSTREAM_TIMEOUT",
            Error::Upstream(_) => "UPSTREAM_ERROR",
            Error::SinkRejected { .. } => "SINK_REJECTED",
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::StateTransition(_) => "FAILED_PRECONDITION",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// Convert to an HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::ArgsValidation { .. } | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::UnknownPluginOrTool { .. } | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ApiVersionUnsupported { .. } | Error::StateTransition(_) => {
                StatusCode::CONFLICT
            }
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::PolicyDenied(_) => StatusCode::FORBIDDEN,
            Error::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Error::Upstream(_) | Error::SinkRejected { .. } => StatusCode::BAD_GATEWAY,
            Error::Manifest { .. }
            | Error::Internal(_)
            | Error::Serialization(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn manifest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_tool(plugin: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::UnknownPluginOrTool {
            plugin: plugin.into(),
            tool: tool.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn policy_denied(msg: impl Into<String>) -> Self {
        Self::PolicyDenied(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(Box::new(err))
    }
}

impl From<RateLimitRejection> for Error {
    fn from(rejection: RateLimitRejection) -> Self {
        Self::RateLimited(Box::new(rejection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamErrorKind;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            Error::unknown_tool("p", "t").code(),
            "UNKNOWN_PLUGIN_OR_TOOL"
        );
        assert_eq!(
            Error::ApiVersionUnsupported {
                plugins: vec!["legacy".into()]
            }
            .code(),
            "API_VERSION_UNSUPPORTED"
        );
        assert_eq!(Error::policy_denied("no").code(), "POLICY_DENIED");
    }

    #[test]
    fn test_upstream_timeout_maps_to_gateway_timeout() {
        let err: Error = UpstreamError::new(
            UpstreamErrorKind::Timeout,
            None,
            "deadline elapsed",
            "http://backend/tools/scan",
        )
        .into();
        assert_eq!(err.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "UPSTREAM_TIMEOUT");

        let err: Error = UpstreamError::new(
            UpstreamErrorKind::Connect,
            None,
            "connection refused",
            "http://backend/tools/scan",
        )
        .into();
        assert_eq!(err.http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "UPSTREAM_ERROR");
    }

    #[test]
    fn test_args_validation_message_lists_errors() {
        let err = Error::ArgsValidation {
            plugin: "quotes".into(),
            tool: "lookup".into(),
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "invalid arguments for quotes/lookup: a; b");
    }
}
