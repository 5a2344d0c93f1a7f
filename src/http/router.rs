//! Route table and request-id middleware.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use super::handlers::{ingest, plugins, AppState};
use crate::ingest::SeenSetStore;
use crate::types::RequestId;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Invocation surface. Pass a store to also host the reference sink.
pub fn build_router(state: AppState, sink: Option<Arc<SeenSetStore>>) -> Router {
    let mut router = Router::new()
        .route("/health", get(plugins::health))
        .route("/plugins/tools", get(plugins::list_tools))
        .route("/plugins/invoke/{plugin}/{tool}", post(plugins::invoke))
        .route("/plugins/manifests/{plugin}", get(plugins::get_manifest))
        .route("/plugins/jobs/{job_id}", get(plugins::get_job))
        .route("/plugins/refresh", post(plugins::refresh))
        .with_state(state);

    if let Some(store) = sink {
        router = router.merge(sink_router(store));
    }

    router.layer(middleware::from_fn(request_id_middleware))
}

/// Reference ingestion sink on its own.
pub fn sink_router(store: Arc<SeenSetStore>) -> Router {
    Router::new()
        .route("/v1/ingest/plugin-run", post(ingest::ingest_plugin_run))
        .route(
            "/v1/ingest/threat-indicators",
            post(ingest::ingest_threat_indicators),
        )
        .with_state(store)
}

/// Take `X-Request-Id` or mint one, expose it to handlers, echo it back.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| RequestId::from_string(v.to_string()).ok())
        .unwrap_or_default();

    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        "request_received"
    );

    request.extensions_mut().insert(request_id.clone());
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PluginRuntime;
    use crate::types::Config;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> Router {
        let mut config = Config::default();
        config.plugins.directory = dir.path().to_path_buf();
        config.sink.spill_dir = dir.path().join("spill");
        let runtime = PluginRuntime::builder(&config).build().unwrap();
        build_router(
            AppState {
                runtime: Arc::new(runtime),
            },
            None,
        )
    }

    #[tokio::test]
    async fn test_request_id_echoed() {
        let dir = TempDir::new().unwrap();
        let response = app(&dir)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn test_request_id_generated() {
        let dir = TempDir::new().unwrap();
        let response = app(&dir)
            .oneshot(axum::http::Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers()[REQUEST_ID_HEADER].is_empty());
    }
}
