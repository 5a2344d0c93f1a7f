//! Invocation gateway: resolves and validates a tool call before admission.
//!
//! Order matters: resolution, version check and argument validation all run
//! before any rate-limit token is consumed or any body executes.

use serde_json::{Map, Value};
use std::sync::Arc;

use super::schema::CompiledSchema;
use crate::manifest::model::ToolSpec;
use crate::manifest::ManifestRegistry;
use crate::types::{Error, Result};

/// A fully admitted call, ready for policy, rate limiting and execution.
#[derive(Debug, Clone)]
pub struct ValidatedCall {
    pub plugin: String,
    pub plugin_version: String,
    pub tool: ToolSpec,
    pub args: Value,
    pub base_url: Option<String>,
    pub result_validator: Option<Arc<CompiledSchema>>,
}

impl ValidatedCall {
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.plugin, self.tool.name)
    }
}

#[derive(Debug, Clone)]
pub struct InvocationGateway {
    registry: Arc<ManifestRegistry>,
}

impl InvocationGateway {
    pub fn new(registry: Arc<ManifestRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ManifestRegistry> {
        &self.registry
    }

    /// Resolve `plugin/tool` and validate `args` against its argsSchema.
    ///
    /// A `null` body (nothing sent) is validated as `{}`.
    pub async fn admit(&self, plugin: &str, tool: &str, args: Value) -> Result<ValidatedCall> {
        let snapshot = self.registry.snapshot().await?;

        let manifest = snapshot
            .report
            .manifests
            .get(plugin)
            .ok_or_else(|| Error::unknown_tool(plugin, tool))?;
        let entry = snapshot
            .catalog
            .get(plugin, tool)
            .ok_or_else(|| Error::unknown_tool(plugin, tool))?;

        if !manifest.is_supported_by(&self.registry.supported()) {
            return Err(Error::ApiVersionUnsupported {
                plugins: vec![plugin.to_string()],
            });
        }

        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let errors = entry.args_validator.errors(&args);
        if !errors.is_empty() {
            tracing::debug!(plugin, tool, violations = errors.len(), "args_validation_failed");
            return Err(Error::ArgsValidation {
                plugin: plugin.to_string(),
                tool: tool.to_string(),
                errors,
            });
        }

        Ok(ValidatedCall {
            plugin: plugin.to_string(),
            plugin_version: manifest.version.clone(),
            tool: entry.tool.clone(),
            args,
            base_url: manifest.endpoints.base_url.clone(),
            result_validator: entry.result_validator.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestCache;
    use crate::types::ApiVersionRange;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn gateway(dir: &Path) -> InvocationGateway {
        InvocationGateway::new(Arc::new(ManifestRegistry::new(
            dir,
            ApiVersionRange::default(),
            ManifestCache::new(Duration::from_secs(60)),
        )))
    }

    fn write(dir: &Path, file: &str, body: Value) {
        std::fs::write(dir.join(file), body.to_string()).unwrap();
    }

    fn quotes(dir: &Path) {
        write(
            dir,
            "quotes.json",
            json!({
                "apiVersion": "v1",
                "name": "quotes",
                "version": "2.1.0",
                "capabilities": {"tools": [{
                    "name": "lookup",
                    "argsSchema": {"ticker": {"type": "string"}},
                }]},
                "endpoints": {"baseUrl": "http://quotes.internal"},
            }),
        );
    }

    #[tokio::test]
    async fn test_admit_valid_call() {
        let dir = TempDir::new().unwrap();
        quotes(dir.path());

        let call = gateway(dir.path())
            .admit("quotes", "lookup", json!({"ticker": "ACME"}))
            .await
            .unwrap();
        assert_eq!(call.plugin_version, "2.1.0");
        assert_eq!(call.base_url.as_deref(), Some("http://quotes.internal"));
        assert_eq!(call.qualified_name(), "quotes/lookup");
    }

    #[tokio::test]
    async fn test_empty_body_rejected_by_required_field() {
        let dir = TempDir::new().unwrap();
        quotes(dir.path());

        let err = gateway(dir.path())
            .admit("quotes", "lookup", Value::Null)
            .await
            .unwrap_err();
        match err {
            Error::ArgsValidation { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("ticker"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_plugin_and_tool() {
        let dir = TempDir::new().unwrap();
        quotes(dir.path());
        let gateway = gateway(dir.path());

        let err = gateway.admit("ghost", "lookup", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PLUGIN_OR_TOOL");
        let err = gateway.admit("quotes", "ghost", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PLUGIN_OR_TOOL");
    }

    #[tokio::test]
    async fn test_unsupported_manifest_not_admitted() {
        let dir = TempDir::new().unwrap();
        quotes(dir.path());
        write(
            dir.path(),
            "legacy.json",
            json!({
                "apiVersion": "v0", "name": "legacy", "version": "0.1",
                "capabilities": {"tools": [{"name": "run"}]},
            }),
        );
        let gateway = gateway(dir.path());

        let err = gateway.admit("legacy", "run", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "API_VERSION_UNSUPPORTED");
        // The compatible plugin is still admitted.
        assert!(gateway
            .admit("quotes", "lookup", json!({"ticker": "ACME"}))
            .await
            .is_ok());
    }
}
