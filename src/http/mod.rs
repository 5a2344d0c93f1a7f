//! HTTP surface (axum).
//!
//! - **router**: route table and request-id middleware
//! - **handlers**: invocation endpoints and the reference ingestion sink
//! - **error**: `Error` → JSON error response
//! - **server**: bind/serve with graceful shutdown

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use handlers::AppState;
pub use router::{build_router, sink_router, REQUEST_ID_HEADER};
pub use server::HttpServer;
