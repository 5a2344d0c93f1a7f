//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

fn json_requested(config: &ObservabilityConfig) -> bool {
    std::env::var("JEEVES_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(config.json_logs)
}

/// `rust_log` (the `RUST_LOG` value) wins over `level`; `info` if neither parses.
fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize tracing subscriber once for the process.
///
/// `RUST_LOG` wins over the configured level. Format is compact text unless
/// `JEEVES_LOG_FORMAT=json` or `json_logs` is set.
pub fn init_tracing(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        let env_filter = build_filter(rust_log.as_deref(), &config.log_level);

        let result = if json_requested(config) {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

// Installing the global subscriber is covered by tests/observability_init.rs,
// which runs in its own process.
#[cfg(test)]
mod tests {
    use super::build_filter;

    #[test]
    fn test_configured_level_used_without_rust_log() {
        assert_eq!(build_filter(None, "debug").to_string(), "debug");
    }

    #[test]
    fn test_rust_log_wins() {
        assert_eq!(build_filter(Some("warn"), "debug").to_string(), "warn");
    }
}
