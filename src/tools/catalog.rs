//! Tool catalog: the flattened `{plugin, ToolSpec}` view over loaded manifests.
//!
//! Owns compiled schemas next to each entry so admission never recompiles.
//! Rebuilt wholesale whenever the manifest cache refreshes.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::schema::CompiledSchema;
use crate::manifest::model::{PluginManifest, ToolSpec};
use crate::types::Error;

// =============================================================================
// Catalog entry
// =============================================================================

/// One invokable tool, tagged with the plugin that declares it.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub plugin: String,
    #[serde(flatten)]
    pub tool: ToolSpec,
    #[serde(skip)]
    pub args_validator: Arc<CompiledSchema>,
    #[serde(skip)]
    pub result_validator: Option<Arc<CompiledSchema>>,
}

impl CatalogEntry {
    fn build(plugin: &str, tool: &ToolSpec) -> Result<Self, String> {
        let args_validator = CompiledSchema::compile_args(&tool.args_schema)
            .map_err(|e| format!("{}.argsSchema: {}", tool.name, e))?;
        let result_validator = tool
            .result_schema
            .as_ref()
            .map(CompiledSchema::compile)
            .transpose()
            .map_err(|e| format!("{}.resultSchema: {}", tool.name, e))?;
        Ok(Self {
            plugin: plugin.to_string(),
            tool: tool.clone(),
            args_validator: Arc::new(args_validator),
            result_validator: result_validator.map(Arc::new),
        })
    }

    /// `plugin/tool` identifier used for grants and per-tool limits.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.plugin, self.tool.name)
    }
}

// =============================================================================
// Tool catalog
// =============================================================================

/// Ordered catalog: plugins by name, tools in manifest order.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<(String, String), usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the loaded manifests.
    ///
    /// Schemas were already checked at load time, so a compile failure here
    /// indicates a manifest that bypassed the loader.
    pub fn from_manifests(
        manifests: &BTreeMap<String, Arc<PluginManifest>>,
    ) -> crate::types::Result<Self> {
        let mut catalog = Self::new();
        for (name, manifest) in manifests {
            for tool in manifest.tools() {
                let entry = CatalogEntry::build(name, tool)
                    .map_err(|e| Error::internal(format!("catalog build for {}: {}", name, e)))?;
                catalog.register(entry)?;
            }
        }
        Ok(catalog)
    }

    /// Register a tool entry.
    pub fn register(&mut self, entry: CatalogEntry) -> crate::types::Result<()> {
        let key = (entry.plugin.clone(), entry.tool.name.clone());
        if self.index.contains_key(&key) {
            return Err(Error::validation(format!(
                "tool {} already registered",
                entry.qualified_name()
            )));
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, plugin: &str, tool: &str) -> Option<&CatalogEntry> {
        self.index
            .get(&(plugin.to_string(), tool.to_string()))
            .map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
