//! Plugin runtime: admission, execution and delivery wired together.
//!
//! Control flow for one invocation:
//! ```text
//! gateway.admit → policy.decide → limiter.check → engine.execute → sink.ingest
//! ```
//! Everything before `execute` rejects synchronously and consumes nothing it
//! does not own; everything after it is recorded on the job.

pub mod bodies;
pub mod cleanup;
pub mod engine;
pub mod jobs;
pub mod rate_limiter;
pub mod recovery;
pub mod result;

pub use bodies::{HttpToolBody, MockToolBody, ToolBody, ToolContext, ToolError};
pub use cleanup::{RetentionService, RetentionStats};
pub use engine::ExecutionEngine;
pub use jobs::{ExecutionJob, JobError, JobErrorKind, JobStatus, JobStore};
pub use rate_limiter::{
    parse_rate, RateLimitRejection, RateLimitScope, RateLimitStatus, RateLimiter, TokenBucket,
};
pub use result::{normalize_output, ExecutionResult, GraphEntity};

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::{
    IngestReceipt, IngestionSinkClient, PluginRunPayload, SpillReplayService, SpillStore,
};
use crate::manifest::ManifestRegistry;
use crate::tools::{AllowAll, InvocationGateway, PolicyDecision, PolicyVerdict};
use crate::types::{Config, Error, Identity, JobId, RequestId, Result, RetentionConfig};
use crate::upstream::{HttpTransport, ReqwestTransport, ResilientHttpClient, RetryPolicy};

/// One tool call as received from a client.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub identity: Identity,
    pub plugin: String,
    pub tool: String,
    pub args: Value,
    pub request_id: Option<RequestId>,
}

/// A finished invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationOutcome {
    pub job: ExecutionJob,
    #[serde(skip)]
    pub rate_limit: Option<RateLimitStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<IngestReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_error: Option<String>,
}

pub struct PluginRuntime {
    gateway: InvocationGateway,
    policy: Arc<dyn PolicyDecision>,
    limiter: Arc<RateLimiter>,
    engine: ExecutionEngine,
    sink: IngestionSinkClient,
    retention: RetentionConfig,
    replay_interval: Duration,
}

impl std::fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("gateway", &self.gateway)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl PluginRuntime {
    pub fn builder(config: &Config) -> PluginRuntimeBuilder {
        PluginRuntimeBuilder {
            config: config.clone(),
            policy: None,
            transport: None,
        }
    }

    pub fn registry(&self) -> &Arc<ManifestRegistry> {
        self.gateway.registry()
    }

    pub fn gateway(&self) -> &InvocationGateway {
        &self.gateway
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        self.engine.jobs()
    }

    pub fn sink(&self) -> &IngestionSinkClient {
        &self.sink
    }

    /// Register an in-process body for `plugin/tool`.
    pub async fn register_body(&self, qualified_tool: &str, body: Arc<dyn ToolBody>) {
        self.engine.register_body(qualified_tool, body).await;
    }

    /// Sweeper over this runtime's jobs and buckets. Not started.
    pub fn retention_service(&self) -> RetentionService {
        RetentionService::new(
            Arc::clone(self.engine.jobs()),
            Arc::clone(&self.limiter),
            self.retention.clone(),
        )
    }

    /// Replayer for this runtime's spill directory. Not started.
    pub fn spill_replay_service(&self) -> SpillReplayService {
        SpillReplayService::new(self.sink.clone(), self.replay_interval)
    }

    /// Admit, authorize, rate-limit, execute and deliver one call.
    ///
    /// Returns `Err` only for rejections before execution. Execution
    /// failures are on the returned job; a sink rejection is reported in
    /// `ingestion_error`.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutcome> {
        let call = self
            .gateway
            .admit(&request.plugin, &request.tool, request.args)
            .await?;

        if let PolicyVerdict::Deny(reason) = self.policy.decide(&request.identity, &call) {
            tracing::info!(
                identity = %request.identity,
                tool = %call.qualified_name(),
                reason = %reason,
                "policy_denied"
            );
            return Err(Error::policy_denied(reason));
        }

        let rate_limit = self
            .limiter
            .check(request.identity.as_str(), &call.plugin, &call.tool.name)
            .await?;

        let job = self
            .engine
            .execute(&call, JobId::new(), request.request_id)
            .await?;

        let mut outcome = InvocationOutcome {
            job,
            rate_limit,
            ingestion: None,
            ingestion_error: None,
        };
        if outcome.job.status == JobStatus::Completed {
            let payload = PluginRunPayload::from_job(&outcome.job);
            match self.sink.ingest_execution_result(&payload).await {
                Ok(receipt) => outcome.ingestion = Some(receipt),
                Err(e) => {
                    tracing::error!(job_id = %outcome.job.job_id, error = %e, "ingest_failed");
                    outcome.ingestion_error = Some(e.to_string());
                }
            }
        }
        Ok(outcome)
    }
}

pub struct PluginRuntimeBuilder {
    config: Config,
    policy: Option<Arc<dyn PolicyDecision>>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl std::fmt::Debug for PluginRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntimeBuilder")
            .field("config", &self.config)
            .field("custom_policy", &self.policy.is_some())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl PluginRuntimeBuilder {
    pub fn policy(mut self, policy: Arc<dyn PolicyDecision>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Replace the reqwest transport used for plugin backends and the sink.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<PluginRuntime> {
        let config = self.config;
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let http = ResilientHttpClient::new(
            transport,
            RetryPolicy::from_config(&config.http),
            config.http.default_timeout,
        );

        let registry = Arc::new(ManifestRegistry::from_config(&config.plugins));
        let engine = ExecutionEngine::new(
            Arc::new(JobStore::new()),
            Some(Arc::new(HttpToolBody::new(http.clone()))),
            config.plugins.test_mode,
        );
        let sink = IngestionSinkClient::new(
            http,
            config.sink.base_url.clone(),
            SpillStore::new(config.sink.spill_dir.clone()),
        );

        Ok(PluginRuntime {
            gateway: InvocationGateway::new(registry),
            policy: self.policy.unwrap_or_else(|| Arc::new(AllowAll)),
            limiter: Arc::new(RateLimiter::from_settings(&config.rate_limits)),
            engine,
            sink,
            retention: config.retention,
            replay_interval: config.sink.replay_interval,
        })
    }
}
