//! Tool bodies: the code that actually runs for an invocation.
//!
//! Three kinds: a deterministic mock for test mode, a body registered in
//! process for `plugin/tool`, and a remote call to the plugin's backend.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

use crate::types::{JobId, RequestId};
use crate::upstream::{RequestOptions, ResilientHttpClient, UpstreamError};

/// Everything a body gets to see about the call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub job_id: JobId,
    pub plugin: String,
    pub tool: String,
    pub args: Value,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ToolError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

#[async_trait]
pub trait ToolBody: Send + Sync {
    async fn invoke(&self, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Deterministic stand-in used in test mode. Same call, same output.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockToolBody;

#[async_trait]
impl ToolBody for MockToolBody {
    async fn invoke(&self, ctx: &ToolContext) -> Result<Value, ToolError> {
        let qualified = format!("{}/{}", ctx.plugin, ctx.tool);
        Ok(json!({
            "graph_entities": [{
                "type": "mock_result",
                "id": qualified,
                "properties": {"plugin": ctx.plugin, "tool": ctx.tool, "args": ctx.args},
            }],
            "search_documents": [{
                "id": format!("mock:{}", qualified),
                "plugin": ctx.plugin,
                "tool": ctx.tool,
                "content": format!("mock output for {}", qualified),
            }],
        }))
    }
}

/// `POST <baseUrl>/tools/<tool>` with the args as the JSON body.
#[derive(Debug, Clone)]
pub struct HttpToolBody {
    client: ResilientHttpClient,
}

impl HttpToolBody {
    pub fn new(client: ResilientHttpClient) -> Self {
        Self { client }
    }

    pub fn endpoint(base_url: &str, tool: &str) -> String {
        format!("{}/tools/{}", base_url.trim_end_matches('/'), tool)
    }
}

#[async_trait]
impl ToolBody for HttpToolBody {
    async fn invoke(&self, ctx: &ToolContext) -> Result<Value, ToolError> {
        let base_url = ctx
            .base_url
            .as_deref()
            .ok_or_else(|| ToolError::failed("plugin declares no endpoints.baseUrl"))?;
        let url = Self::endpoint(base_url, &ctx.tool);

        let mut options = RequestOptions::new()
            .json(ctx.args.clone())
            .timeout(ctx.timeout)
            .header("X-Job-Id", ctx.job_id.as_str());
        if let Some(request_id) = &ctx.request_id {
            options = options.request_id(request_id.clone());
        }
        Ok(self.client.call_json(Method::POST, &url, options).await?)
    }
}
