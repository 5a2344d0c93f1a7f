//! Outbound HTTP to plugin backends and the ingestion sink.

pub mod client;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{RequestOptions, ResilientHttpClient};
pub use error::{TransportError, UpstreamError, UpstreamErrorKind};
pub use retry::{is_retryable_method, RetryPolicy};
pub use transport::{HttpResponse, HttpTransport, OutboundRequest, ReqwestTransport};
