//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file, then overridden by
//! `JEEVES_*` environment variables.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{self, Error};

/// Global runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Plugin discovery and execution.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Rate-limit strings per scope.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,

    /// Outbound HTTP behaviour.
    #[serde(default)]
    pub http: HttpClientConfig,

    /// Ingestion sink delivery.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Background retention sweeps.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8088".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Inclusive range of supported manifest apiVersion majors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiVersionRange {
    pub min: u32,
    pub max: u32,
}

impl ApiVersionRange {
    pub fn contains(&self, major: u32) -> bool {
        (self.min..=self.max).contains(&major)
    }
}

impl Default for ApiVersionRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

/// Plugin discovery and execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory scanned for manifests.
    pub directory: PathBuf,

    /// Manifest cache TTL.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub refresh_interval: Duration,

    /// Supported apiVersion majors.
    pub supported_api_versions: ApiVersionRange,

    /// Substitute deterministic mock bodies for every tool.
    pub test_mode: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
            refresh_interval: Duration::from_secs(60),
            supported_api_versions: ApiVersionRange::default(),
            test_mode: false,
        }
    }
}

/// Rate-limit strings (`"<N>/<second|minute|hour>"`). Unparsable strings disable
/// the corresponding bucket.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Shared by every invocation.
    pub global: String,

    /// Applied per identity and tool.
    pub per_identity: String,

    /// Overrides of `per_identity` keyed by `plugin/tool`.
    pub per_tool: HashMap<String, String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: "600/minute".to_string(),
            per_identity: "60/minute".to_string(),
            per_tool: HashMap::new(),
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Per-request timeout when the caller sets none.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub default_timeout: Duration,

    /// Attempts for read-style (idempotent) methods.
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub initial_backoff: Duration,

    /// Backoff growth factor.
    pub backoff_multiplier: f64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }
}

/// Ingestion sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SinkConfig {
    /// Base address of the downstream store. `None` spills everything.
    pub base_url: Option<String>,

    /// Local fallback spill directory.
    pub spill_dir: PathBuf,

    /// Also host the in-memory reference sink on the server.
    pub serve_local: bool,

    /// How often the spill directory is replayed against the sink.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub replay_interval: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            spill_dir: PathBuf::from("spill"),
            serve_local: false,
            replay_interval: Duration::from_secs(30),
        }
    }
}

/// Retention sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetentionConfig {
    /// How often the sweeper runs.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub interval: Duration,

    /// How long terminal jobs stay queryable.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub job_retention: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            job_retention: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Load configuration from an optional JSON file and apply env overrides.
    pub fn load(path: Option<&Path>) -> errors::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw).map_err(|e| {
                    Error::validation(format!("invalid config {}: {}", path.display(), e))
                })?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `JEEVES_*` overrides from the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> errors::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("JEEVES_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("JEEVES_LOG_LEVEL") {
            self.observability.log_level = v;
        }
        if let Some(v) = lookup("JEEVES_PLUGIN_DIR") {
            self.plugins.directory = PathBuf::from(v);
        }
        if let Some(v) = lookup("JEEVES_MANIFEST_REFRESH") {
            self.plugins.refresh_interval = humantime_serde::re::humantime::parse_duration(&v)
                .map_err(|e| Error::validation(format!("JEEVES_MANIFEST_REFRESH: {}", e)))?;
        }
        if let Some(v) = lookup("JEEVES_TEST_MODE") {
            self.plugins.test_mode = parse_flag(&v);
        }
        if let Some(v) = lookup("JEEVES_RATE_LIMIT_GLOBAL") {
            self.rate_limits.global = v;
        }
        if let Some(v) = lookup("JEEVES_RATE_LIMIT_IDENTITY") {
            self.rate_limits.per_identity = v;
        }
        if let Some(v) = lookup("JEEVES_SINK_URL") {
            self.sink.base_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("JEEVES_SPILL_DIR") {
            self.sink.spill_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("JEEVES_SPILL_REPLAY_INTERVAL") {
            self.sink.replay_interval = humantime_serde::re::humantime::parse_duration(&v)
                .map_err(|e| Error::validation(format!("JEEVES_SPILL_REPLAY_INTERVAL: {}", e)))?;
        }
        Ok(())
    }

    /// JSON Schema of the configuration document.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
