//! Manifest registry: cached discovery plus the fail-closed tool listing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::cache::ManifestCache;
use super::loader::{self, DiscoveryReport};
use super::model::PluginManifest;
use crate::tools::catalog::{CatalogEntry, ToolCatalog};
use crate::types::{ApiVersionRange, Error, PluginsConfig, Result};

/// Everything derived from one discovery pass. Replaced as a unit.
#[derive(Debug)]
pub struct RegistrySnapshot {
    pub report: DiscoveryReport,
    pub catalog: ToolCatalog,
    /// Plugins whose apiVersion falls outside the supported range, sorted.
    pub incompatible: Vec<String>,
}

impl RegistrySnapshot {
    fn build(report: DiscoveryReport, supported: &ApiVersionRange) -> Result<Self> {
        let incompatible: Vec<String> = report
            .manifests
            .values()
            .filter(|m| !m.is_supported_by(supported))
            .map(|m| m.name.clone())
            .collect();
        for name in &incompatible {
            tracing::warn!(plugin = %name, "manifest_api_version_unsupported");
        }
        let catalog = ToolCatalog::from_manifests(&report.manifests)?;
        Ok(Self {
            report,
            catalog,
            incompatible,
        })
    }
}

/// Owns the plugin directory and the cache of its discovery results.
#[derive(Debug)]
pub struct ManifestRegistry {
    directory: PathBuf,
    supported: ApiVersionRange,
    cache: ManifestCache<RegistrySnapshot>,
    /// Single-flight guard so concurrent misses scan the directory once.
    refresh_lock: Mutex<()>,
}

impl ManifestRegistry {
    pub fn new(
        directory: impl Into<PathBuf>,
        supported: ApiVersionRange,
        cache: ManifestCache<RegistrySnapshot>,
    ) -> Self {
        Self {
            directory: directory.into(),
            supported,
            cache,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &PluginsConfig) -> Self {
        Self::new(
            config.directory.clone(),
            config.supported_api_versions,
            ManifestCache::new(config.refresh_interval),
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn supported(&self) -> ApiVersionRange {
        self.supported
    }

    /// Current snapshot, rescanning when the cached one has expired.
    pub async fn snapshot(&self) -> Result<Arc<RegistrySnapshot>> {
        if let Some(snapshot) = self.cache.get_fresh().await {
            return Ok(snapshot);
        }
        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(snapshot) = self.cache.get_fresh().await {
            return Ok(snapshot);
        }
        self.rescan().await
    }

    /// Rescan unconditionally and swap the cache.
    pub async fn refresh(&self) -> Result<Arc<RegistrySnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        self.rescan().await
    }

    /// Drop the cached snapshot; the next read rescans.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
        tracing::debug!(directory = %self.directory.display(), "manifest_cache_invalidated");
    }

    async fn rescan(&self) -> Result<Arc<RegistrySnapshot>> {
        let directory = self.directory.clone();
        let report = tokio::task::spawn_blocking(move || loader::discover(&directory))
            .await
            .map_err(|e| Error::internal(format!("manifest discovery task failed: {}", e)))??;

        let snapshot = Arc::new(RegistrySnapshot::build(report, &self.supported)?);
        self.cache.replace(Arc::clone(&snapshot)).await;
        Ok(snapshot)
    }

    /// Flattened catalog. Fails closed when any loaded manifest declares an
    /// unsupported apiVersion.
    pub async fn list_tools(&self) -> Result<Vec<CatalogEntry>> {
        let snapshot = self.snapshot().await?;
        if !snapshot.incompatible.is_empty() {
            return Err(Error::ApiVersionUnsupported {
                plugins: snapshot.incompatible.clone(),
            });
        }
        Ok(snapshot.catalog.entries().to_vec())
    }

    pub async fn get_manifest(&self, name: &str) -> Result<Arc<PluginManifest>> {
        let snapshot = self.snapshot().await?;
        snapshot
            .report
            .manifests
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("plugin '{}'", name)))
    }

    /// The most recent discovery report.
    pub async fn report(&self) -> Result<DiscoveryReport> {
        Ok(self.snapshot().await?.report.clone())
    }
}
