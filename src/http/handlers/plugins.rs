//! Invocation surface handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::http::error::{job_error_response, rate_limit_headers};
use crate::runtime::{InvocationOutcome, InvocationRequest, JobErrorKind, JobStatus, PluginRuntime};
use crate::types::{Error, Identity, JobId, RequestId, Result};

pub const IDENTITY_HEADER: &str = "x-identity";

#[derive(Debug, Clone)]
pub struct AppState {
    pub runtime: Arc<PluginRuntime>,
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn list_tools(State(state): State<AppState>) -> Result<Json<Value>> {
    let tools = state.runtime.registry().list_tools().await?;
    Ok(Json(json!({ "tools": tools })))
}

pub async fn get_manifest(
    State(state): State<AppState>,
    Path(plugin): Path<String>,
) -> Result<Json<Value>> {
    let manifest = state.runtime.registry().get_manifest(&plugin).await?;
    Ok(Json(serde_json::to_value(manifest.as_ref())?))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>> {
    let job_id = JobId::from_string(job_id).map_err(Error::validation)?;
    let job = state
        .runtime
        .jobs()
        .get(&job_id)
        .await
        .ok_or_else(|| Error::not_found(format!("job {}", job_id)))?;
    Ok(Json(serde_json::to_value(job)?))
}

pub async fn refresh(State(state): State<AppState>) -> Result<Json<Value>> {
    let snapshot = state.runtime.registry().refresh().await?;
    Ok(Json(serde_json::to_value(&snapshot.report)?))
}

fn identity_from(headers: &HeaderMap) -> Identity {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Identity::from_string(v.trim().to_string()).ok())
        .unwrap_or_else(Identity::anonymous)
}

/// Empty body means "no arguments"; the gateway decides what that implies.
fn parse_args(body: &Bytes) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| Error::validation(format!("invalid JSON body: {}", e)))
}

pub async fn invoke(
    State(state): State<AppState>,
    Path((plugin, tool)): Path<(String, String)>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request = InvocationRequest {
        identity: identity_from(&headers),
        plugin,
        tool,
        args: parse_args(&body)?,
        request_id: Some(request_id.clone()),
    };
    let outcome = state.runtime.invoke(request).await?;
    Ok(outcome_response(outcome, &request_id))
}

/// Completed and plainly failed jobs are a 200 job summary. Deadline and
/// upstream failures become gateway errors carrying the job id. Every
/// executed call spent a token, so all of them carry the rate-limit headers.
fn outcome_response(outcome: InvocationOutcome, request_id: &RequestId) -> Response {
    let headers = outcome
        .rate_limit
        .as_ref()
        .map(rate_limit_headers)
        .unwrap_or_default();
    let job = &outcome.job;
    let mut details = Map::new();
    details.insert("job_id".to_string(), json!(job.job_id));

    if job.status == JobStatus::Timeout {
        return job_error_response(
            StatusCode::GATEWAY_TIMEOUT,
            headers,
            "EXECUTION_TIMEOUT",
            job.error.as_ref().map_or("execution timed out", |e| e.message.as_str()),
            details,
        );
    }

    if let Some(error) = job.error.as_ref() {
        if let Some(url) = error.upstream_url.as_ref() {
            tracing::warn!(
                request_id = %request_id,
                job_id = %job.job_id,
                upstream_url = %url,
                upstream_status = ?error.upstream_status,
                "invoke_upstream_failed"
            );
            details.insert("upstream_url".to_string(), json!(url));
            details.insert("upstream_status".to_string(), json!(error.upstream_status));
            let (status, code) = match error.kind {
                JobErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
                _ => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            };
            return job_error_response(status, headers, code, &error.message, details);
        }
    }

    (StatusCode::OK, headers, Json(outcome)).into_response()
}
