//! HTTP server wrapping the plugin runtime.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::handlers::AppState;
use super::router::build_router;
use crate::ingest::SeenSetStore;
use crate::runtime::PluginRuntime;

#[derive(Debug)]
pub struct HttpServer {
    runtime: Arc<PluginRuntime>,
    addr: SocketAddr,
    sink: Option<Arc<SeenSetStore>>,
    cancel: CancellationToken,
}

impl HttpServer {
    pub fn new(runtime: Arc<PluginRuntime>, addr: SocketAddr) -> Self {
        Self {
            runtime,
            addr,
            sink: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Also serve the reference ingestion endpoints from `store`.
    pub fn with_local_sink(mut self, store: Arc<SeenSetStore>) -> Self {
        self.sink = Some(store);
        self
    }

    pub fn router(&self) -> Router {
        build_router(
            AppState {
                runtime: Arc::clone(&self.runtime),
            },
            self.sink.clone(),
        )
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            local_sink = self.sink.is_some(),
            "http_server_listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned())
            .await?;
        tracing::info!("http_server_stopped");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
