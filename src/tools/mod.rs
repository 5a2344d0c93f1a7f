//! Tool infrastructure: catalog, schemas, admission and access control.
//!
//! The catalog owns compiled schemas; the gateway uses them to admit calls;
//! the access module holds the single policy decision point.

pub mod access;
pub mod catalog;
pub mod gateway;
pub mod schema;

pub use access::{AllowAll, PolicyDecision, PolicyVerdict, ToolAccessPolicy};
pub use catalog::{CatalogEntry, ToolCatalog};
pub use gateway::{InvocationGateway, ValidatedCall};
pub use schema::{normalize_args_schema, CompiledSchema};
