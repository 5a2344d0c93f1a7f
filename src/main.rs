//! `jeeves-plugind`: plugin runtime HTTP daemon.
//!
//! Discovers manifests, serves the invocation surface and, when configured,
//! hosts the reference ingestion sink in the same process.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use jeeves_plugin_runtime::http::HttpServer;
use jeeves_plugin_runtime::ingest::SeenSetStore;
use jeeves_plugin_runtime::{observability, Config, PluginRuntime};

/// Jeeves plugin runtime daemon.
#[derive(Debug, Parser)]
#[command(name = "jeeves-plugind", author, version, about)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "JEEVES_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(long)]
    listen: Option<String>,

    /// Override the plugin manifest directory.
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Run tools against the deterministic mock body.
    #[arg(long)]
    test_mode: bool,

    /// Print the configuration JSON Schema and exit.
    #[arg(long)]
    print_config_schema: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.print_config_schema {
        println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(dir) = cli.plugin_dir {
        config.plugins.directory = dir;
    }
    if cli.test_mode {
        config.plugins.test_mode = true;
    }

    observability::init_tracing(&config.observability);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let runtime = Arc::new(PluginRuntime::builder(&config).build()?);

    // Surface manifest problems at startup rather than on the first request.
    let snapshot = runtime.registry().snapshot().await?;
    tracing::info!(
        directory = %config.plugins.directory.display(),
        plugins = snapshot.report.manifests.len(),
        failures = snapshot.report.failures.len(),
        tools = snapshot.catalog.len(),
        test_mode = config.plugins.test_mode,
        "plugin_runtime_starting"
    );

    let mut server = HttpServer::new(Arc::clone(&runtime), addr);
    if config.sink.serve_local {
        server = server.with_local_sink(Arc::new(SeenSetStore::new()));
    }

    let mut retention = runtime.retention_service();
    let retention_handle = retention.start();

    let mut replay = config
        .sink
        .base_url
        .is_some()
        .then(|| runtime.spill_replay_service());
    let replay_handle = replay.as_mut().map(|service| service.start());

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown_signal_received");
        }
        cancel.cancel();
    });

    server.serve().await?;

    retention.stop();
    let _ = retention_handle.await;
    if let (Some(mut service), Some(handle)) = (replay, replay_handle) {
        service.stop();
        let _ = handle.await;
    }
    Ok(())
}
