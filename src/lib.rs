//! # Jeeves Plugin Runtime
//!
//! Hosts third-party analysis plugins described by declarative manifests:
//! - Manifest discovery with per-file isolation and a TTL cache
//! - Argument validation against each tool's JSON Schema
//! - Token-bucket rate limiting (global, per identity, per tool)
//! - Deadline-bound execution with job records
//! - Resilient outbound HTTP with bounded retries for idempotent calls
//! - Idempotent ingestion with on-disk spill when the sink is unavailable
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────────────────────────────────────┐
//!   HTTP request →  │                PluginRuntime                 │
//!                   │  ┌─────────┐ ┌────────┐ ┌───────┐ ┌────────┐ │
//!                   │  │ Gateway │→│ Policy │→│Limiter│→│ Engine │ │
//!                   │  └────┬────┘ └────────┘ └───────┘ └───┬────┘ │
//!                   │  ┌────┴─────┐                  ┌──────┴────┐ │
//!                   │  │ Manifest │                  │ Ingestion │ │
//!                   │  │ Registry │                  │   Sink    │ │
//!                   │  └──────────┘                  └───────────┘ │
//!                   └──────────────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod http;
pub mod ingest;
pub mod manifest;
pub mod runtime;
pub mod tools;
pub mod types;
pub mod upstream;
pub mod validation;

// Internal utilities
pub mod observability;

pub use runtime::{InvocationOutcome, InvocationRequest, PluginRuntime};
pub use types::{Config, Error, Result};
