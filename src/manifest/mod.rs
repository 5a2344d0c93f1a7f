//! Manifest discovery, caching and the registry built on top of them.

pub mod cache;
pub mod loader;
pub mod model;
pub mod registry;

pub use cache::ManifestCache;
pub use loader::{discover, load_manifest_file, DiscoveryReport, ManifestFailure, ManifestLoad};
pub use model::{AuthMode, PluginManifest, ToolSpec, DEFAULT_TIMEOUT_MS};
pub use registry::{ManifestRegistry, RegistrySnapshot};
