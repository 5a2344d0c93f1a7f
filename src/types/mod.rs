//! Core types for the plugin runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (JobId, RequestId, Identity)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for discovery, limits, HTTP and ingestion

mod config;
mod errors;
mod ids;

pub use config::{
    ApiVersionRange, Config, HttpClientConfig, ObservabilityConfig, PluginsConfig,
    RateLimitSettings, RetentionConfig, ServerConfig, SinkConfig,
};
pub use errors::{Error, Result};
pub use ids::{Identity, JobId, RequestId};
