//! Manifest document types.
//!
//! A manifest is immutable once loaded; a rescan replaces it wholesale.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::types::ApiVersionRange;

/// Default tool deadline when the manifest omits `timeoutMs`.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// The versioned document declaring a plugin's identity and tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub api_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl PluginManifest {
    /// Major version declared by `apiVersion`, if it parses.
    pub fn api_major(&self) -> Option<u32> {
        parse_api_major(&self.api_version)
    }

    /// Whether `apiVersion` falls inside the supported range. Unparsable
    /// versions are unsupported.
    pub fn is_supported_by(&self, range: &ApiVersionRange) -> bool {
        self.api_major().is_some_and(|major| range.contains(major))
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.capabilities.tools
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.capabilities.tools.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// How a tool authenticates against its backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Inherit,
    None,
    ApiKey,
    Bearer,
}

/// A single invokable capability advertised by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_object")]
    pub args_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_schema: Option<Value>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub auth: AuthMode,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Parse the major version out of `"v1"`, `"V2"`, `"1"` or `"v1.3"`.
pub fn parse_api_major(api_version: &str) -> Option<u32> {
    let trimmed = api_version.trim();
    let digits = trimmed
        .strip_prefix(|c: char| c == 'v' || c == 'V')
        .unwrap_or(trimmed);
    digits.split('.').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_api_major() {
        assert_eq!(parse_api_major("v1"), Some(1));
        assert_eq!(parse_api_major("V2"), Some(2));
        assert_eq!(parse_api_major("1"), Some(1));
        assert_eq!(parse_api_major(" v1.4 "), Some(1));
        assert_eq!(parse_api_major("v0"), Some(0));
        assert_eq!(parse_api_major("beta"), None);
        assert_eq!(parse_api_major(""), None);
    }

    #[test]
    fn test_tool_defaults() {
        let manifest: PluginManifest = serde_json::from_value(json!({
            "apiVersion": "v1",
            "name": "quotes",
            "version": "1.0.0",
            "capabilities": {"tools": [{"name": "lookup"}]},
        }))
        .unwrap();

        let tool = manifest.tool("lookup").unwrap();
        assert_eq!(tool.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(tool.auth, AuthMode::Inherit);
        assert!(tool.permissions.is_empty());
        assert_eq!(tool.args_schema, json!({}));
        assert!(manifest.endpoints.base_url.is_none());
    }

    #[test]
    fn test_supported_range() {
        let range = ApiVersionRange { min: 1, max: 2 };
        let mut manifest: PluginManifest = serde_json::from_value(json!({
            "apiVersion": "v2", "name": "p", "version": "1",
        }))
        .unwrap();
        assert!(manifest.is_supported_by(&range));

        manifest.api_version = "v0".into();
        assert!(!manifest.is_supported_by(&range));

        manifest.api_version = "latest".into();
        assert!(!manifest.is_supported_by(&range));
    }

    #[test]
    fn test_unknown_auth_mode_rejected() {
        let parsed: Result<ToolSpec, _> = serde_json::from_value(json!({
            "name": "t", "auth": "kerberos",
        }));
        assert!(parsed.is_err());
    }
}
