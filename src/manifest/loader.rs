//! Manifest discovery: scan a plugin directory and parse every manifest.
//!
//! Each candidate file yields a tagged [`ManifestLoad`]: either the parsed
//! manifest or the reason it was rejected. A bad file never prevents the
//! others from loading.
//!
//! Layout:
//! ```text
//! plugins/
//! ├── quotes.json              top-level .json / .yaml / .yml files
//! ├── scanner.yaml
//! └── whois/
//!     └── manifest.yaml        sub-directories with a manifest.{json,yaml,yml}
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::model::PluginManifest;
use crate::tools::schema::CompiledSchema;
use crate::types::{Error, Result};
use crate::validation::{validate_non_empty, validate_positive};

const MANIFEST_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];
const DIR_MANIFEST_NAMES: &[&str] = &["manifest.json", "manifest.yaml", "manifest.yml"];

/// Outcome of loading one manifest file.
#[derive(Debug, Clone)]
pub enum ManifestLoad {
    Loaded {
        path: PathBuf,
        manifest: PluginManifest,
    },
    Failed(ManifestFailure),
}

/// A manifest file that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl From<ManifestFailure> for Error {
    fn from(failure: ManifestFailure) -> Self {
        Error::manifest(failure.path, failure.reason)
    }
}

/// Result of one directory scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub directory: PathBuf,
    pub manifests: BTreeMap<String, Arc<PluginManifest>>,
    pub failures: Vec<ManifestFailure>,
    pub loaded_at: DateTime<Utc>,
}

impl DiscoveryReport {
    pub fn empty(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
            manifests: BTreeMap::new(),
            failures: Vec::new(),
            loaded_at: Utc::now(),
        }
    }
}

/// Scan `directory` and return every plugin that loaded, plus failures.
///
/// A missing directory yields an empty report. Two manifests naming the same
/// plugin: the first in path order wins, the second is reported as a failure.
pub fn discover(directory: &Path) -> Result<DiscoveryReport> {
    let mut report = DiscoveryReport::empty(directory);

    for outcome in discover_files(directory)? {
        match outcome {
            ManifestLoad::Loaded { path, manifest } => {
                if report.manifests.contains_key(&manifest.name) {
                    tracing::warn!(
                        path = %path.display(),
                        plugin = %manifest.name,
                        "manifest_duplicate_plugin"
                    );
                    report.failures.push(ManifestFailure {
                        path,
                        reason: format!("duplicate plugin name '{}'", manifest.name),
                    });
                    continue;
                }
                tracing::debug!(
                    path = %path.display(),
                    plugin = %manifest.name,
                    api_version = %manifest.api_version,
                    tools = manifest.tools().len(),
                    "manifest_loaded"
                );
                report
                    .manifests
                    .insert(manifest.name.clone(), Arc::new(manifest));
            }
            ManifestLoad::Failed(failure) => {
                tracing::warn!(
                    path = %failure.path.display(),
                    reason = %failure.reason,
                    "manifest_rejected"
                );
                report.failures.push(failure);
            }
        }
    }

    tracing::info!(
        directory = %directory.display(),
        loaded = report.manifests.len(),
        failed = report.failures.len(),
        "manifest_discovery_complete"
    );
    Ok(report)
}

/// Load every candidate file, in sorted path order.
pub fn discover_files(directory: &Path) -> Result<Vec<ManifestLoad>> {
    Ok(candidate_files(directory)?
        .into_iter()
        .map(|path| match load_manifest_file(&path) {
            Ok(manifest) => ManifestLoad::Loaded { path, manifest },
            Err(Error::Manifest { path, reason }) => {
                ManifestLoad::Failed(ManifestFailure { path, reason })
            }
            Err(other) => ManifestLoad::Failed(ManifestFailure {
                path,
                reason: other.to_string(),
            }),
        })
        .collect())
}

/// Manifest files under `directory`. Hidden entries are skipped.
fn candidate_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(directory = %directory.display(), "plugin_directory_missing");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if hidden {
            continue;
        }

        if path.is_dir() {
            if let Some(found) = DIR_MANIFEST_NAMES
                .iter()
                .map(|name| path.join(name))
                .find(|candidate| candidate.is_file())
            {
                files.push(found);
            }
        } else if has_manifest_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e.as_str()))
}

/// Parse and structurally validate a single manifest file.
pub fn load_manifest_file(path: &Path) -> Result<PluginManifest> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::manifest(path, format!("unreadable: {}", e)))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let manifest: PluginManifest = if is_json {
        serde_json::from_str(&raw).map_err(|e| Error::manifest(path, e.to_string()))?
    } else {
        serde_yaml::from_str(&raw).map_err(|e| Error::manifest(path, e.to_string()))?
    };

    check_manifest(&manifest).map_err(|e| Error::manifest(path, e))?;
    Ok(manifest)
}

/// Structural checks that serde cannot express.
///
/// `apiVersion` support is not checked here: an unsupported manifest still
/// loads so the registry can report it.
fn check_manifest(manifest: &PluginManifest) -> std::result::Result<(), String> {
    let field_err = |e: Error| match e {
        Error::Validation(msg) => msg,
        other => other.to_string(),
    };

    validate_non_empty(&manifest.name, "name").map_err(field_err)?;
    validate_non_empty(&manifest.version, "version").map_err(field_err)?;
    validate_non_empty(&manifest.api_version, "apiVersion").map_err(field_err)?;

    let mut seen = HashSet::new();
    for tool in manifest.tools() {
        validate_non_empty(&tool.name, "tool name").map_err(field_err)?;
        if !seen.insert(tool.name.as_str()) {
            return Err(format!("duplicate tool name '{}'", tool.name));
        }
        validate_positive(tool.timeout_ms, &format!("{}.timeoutMs", tool.name))
            .map_err(field_err)?;
        CompiledSchema::compile_args(&tool.args_schema)
            .map_err(|e| format!("{}.argsSchema: {}", tool.name, e))?;
        if let Some(result_schema) = &tool.result_schema {
            CompiledSchema::compile(result_schema)
                .map_err(|e| format!("{}.resultSchema: {}", tool.name, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        path
    }

    const QUOTES: &str = r#"{
        "apiVersion": "v1",
        "name": "quotes",
        "version": "1.0.0",
        "capabilities": {"tools": [
            {"name": "lookup", "argsSchema": {"ticker": {"type": "string"}}, "timeoutMs": 2000}
        ]}
    }"#;

    const WHOIS_YAML: &str = "
apiVersion: v1
name: whois
version: 0.3.1
provider: acme
capabilities:
  tools:
    - name: query
      argsSchema:
        type: object
        properties:
          domain: {type: string}
        required: [domain]
endpoints:
  baseUrl: http://whois.internal:8080
";

    #[test]
    fn test_discover_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "quotes.json", QUOTES);
        write(dir.path(), "whois/manifest.yaml", WHOIS_YAML);
        write(dir.path(), "README.md", "not a manifest");

        let report = discover(dir.path()).unwrap();
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(
            report.manifests.keys().collect::<Vec<_>>(),
            vec!["quotes", "whois"]
        );
        let whois = &report.manifests["whois"];
        assert_eq!(
            whois.endpoints.base_url.as_deref(),
            Some("http://whois.internal:8080")
        );
        assert_eq!(whois.provider.as_deref(), Some("acme"));
    }

    #[test]
    fn test_bad_file_is_isolated() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "quotes.json", QUOTES);
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "nameless.json", r#"{"apiVersion":"v1","name":"","version":"1"}"#);

        let report = discover(dir.path()).unwrap();
        assert_eq!(report.manifests.len(), 1);
        assert!(report.manifests.contains_key("quotes"));
        assert_eq!(report.failures.len(), 2);
        let reasons: Vec<&str> = report.failures.iter().map(|f| f.reason.as_str()).collect();
        assert!(reasons.iter().any(|r| r.contains("name cannot be empty")));
    }

    #[test]
    fn test_unsupported_version_still_loads() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "legacy.json",
            r#"{"apiVersion":"v0","name":"legacy","version":"0.1"}"#,
        );
        let report = discover(dir.path()).unwrap();
        assert_eq!(report.manifests["legacy"].api_version, "v0");
    }

    #[test]
    fn test_duplicate_plugin_name_first_wins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", QUOTES);
        write(dir.path(), "b.json", QUOTES);

        let report = discover(dir.path()).unwrap();
        assert_eq!(report.manifests.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("b.json"));
        assert!(report.failures[0].reason.contains("duplicate plugin name"));
    }

    #[test]
    fn test_structural_checks() {
        let dir = TempDir::new().unwrap();
        let dup_tools = write(
            dir.path(),
            "dup.json",
            r#"{"apiVersion":"v1","name":"d","version":"1",
                "capabilities":{"tools":[{"name":"x"},{"name":"x"}]}}"#,
        );
        let zero_timeout = write(
            dir.path(),
            "zero.json",
            r#"{"apiVersion":"v1","name":"z","version":"1",
                "capabilities":{"tools":[{"name":"x","timeoutMs":0}]}}"#,
        );
        let bad_schema = write(
            dir.path(),
            "schema.json",
            r#"{"apiVersion":"v1","name":"s","version":"1",
                "capabilities":{"tools":[{"name":"x","argsSchema":{"type":"nope"}}]}}"#,
        );

        let err = load_manifest_file(&dup_tools).unwrap_err();
        assert!(err.to_string().contains("duplicate tool name 'x'"));
        let err = load_manifest_file(&zero_timeout).unwrap_err();
        assert!(err.to_string().contains("x.timeoutMs must be positive"));
        let err = load_manifest_file(&bad_schema).unwrap_err();
        assert!(err.to_string().contains("x.argsSchema"));
        assert_eq!(err.code(), "MANIFEST_INVALID");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let report = discover(&dir.path().join("absent")).unwrap();
        assert!(report.manifests.is_empty());
        assert!(report.failures.is_empty());
    }
}
