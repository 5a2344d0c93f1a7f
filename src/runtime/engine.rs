//! Execution engine: runs an admitted call under its deadline.
//!
//! The body runs in its own task. On deadline the task is aborted, which
//! cancels it at its next await point; work a remote backend already
//! started is not recalled. Failures and panics end up as job state, never
//! as an `Err` from [`ExecutionEngine::execute`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::bodies::{MockToolBody, ToolBody, ToolContext, ToolError};
use super::jobs::{ExecutionJob, JobError, JobStore};
use super::recovery::with_recovery_async;
use super::result::normalize_output;
use crate::tools::ValidatedCall;
use crate::types::{JobId, RequestId, Result};

pub struct ExecutionEngine {
    jobs: Arc<JobStore>,
    bodies: RwLock<HashMap<String, Arc<dyn ToolBody>>>,
    remote: Option<Arc<dyn ToolBody>>,
    test_mode: bool,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("test_mode", &self.test_mode)
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    pub fn new(jobs: Arc<JobStore>, remote: Option<Arc<dyn ToolBody>>, test_mode: bool) -> Self {
        Self {
            jobs,
            bodies: RwLock::new(HashMap::new()),
            remote,
            test_mode,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Register an in-process body for `plugin/tool`, replacing any previous one.
    pub async fn register_body(&self, qualified_tool: &str, body: Arc<dyn ToolBody>) {
        self.bodies
            .write()
            .await
            .insert(qualified_tool.to_string(), body);
    }

    /// Test mode, then a registered body, then the remote backend.
    async fn select_body(&self, call: &ValidatedCall) -> Option<Arc<dyn ToolBody>> {
        if self.test_mode {
            return Some(Arc::new(MockToolBody));
        }
        if let Some(body) = self.bodies.read().await.get(&call.qualified_name()) {
            return Some(Arc::clone(body));
        }
        call.base_url.as_ref()?;
        self.remote.clone()
    }

    /// Run `call` as job `job_id`. Returns the job in its terminal state.
    pub async fn execute(
        &self,
        call: &ValidatedCall,
        job_id: JobId,
        request_id: Option<RequestId>,
    ) -> Result<ExecutionJob> {
        let mut job = ExecutionJob::new(job_id, &call.plugin, &call.tool.name, call.args.clone());
        self.jobs.insert(job.clone()).await?;
        job.start()?;
        self.jobs.update(job.clone()).await?;

        let qualified = call.qualified_name();
        let timeout_ms = call.tool.timeout_ms;
        let started = Instant::now();

        let Some(body) = self.select_body(call).await else {
            job.fail(
                JobError::failed(format!("no executor available for {}", qualified)),
                started.elapsed(),
            )?;
            return self.finish(job).await;
        };

        let ctx = ToolContext {
            job_id: job.job_id.clone(),
            plugin: call.plugin.clone(),
            tool: call.tool.name.clone(),
            args: call.args.clone(),
            base_url: call.base_url.clone(),
            timeout: Duration::from_millis(timeout_ms),
            request_id,
        };
        let operation = qualified.clone();
        let deadline = Duration::from_millis(timeout_ms);
        let mut handle = tokio::spawn(async move {
            with_recovery_async(body.invoke(&ctx), &operation).await
        });

        match tokio::time::timeout(deadline, &mut handle).await {
            Err(_) => {
                handle.abort();
                tracing::warn!(job_id = %job.job_id, tool = %qualified, timeout_ms, "job_timeout");
                job.time_out(timeout_ms, started.elapsed())?;
            }
            // The outbound call carries the same deadline and may report it first.
            Ok(Ok(Ok(Err(ToolError::Upstream(err)))))
                if err.is_timeout() && started.elapsed() >= deadline =>
            {
                tracing::warn!(
                    job_id = %job.job_id,
                    tool = %qualified,
                    timeout_ms,
                    upstream_url = %err.upstream_url,
                    "job_timeout"
                );
                job.time_out(timeout_ms, started.elapsed())?;
            }
            Ok(Err(join_err)) => {
                job.fail(JobError::failed(join_err.to_string()), started.elapsed())?;
            }
            Ok(Ok(Err(panic_msg))) => {
                job.fail(JobError::failed(panic_msg), started.elapsed())?;
            }
            Ok(Ok(Ok(Err(ToolError::Upstream(err))))) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    tool = %qualified,
                    upstream_url = %err.upstream_url,
                    status = ?err.status,
                    error = %err.detail,
                    "job_upstream_error"
                );
                job.fail(JobError::upstream(&err), started.elapsed())?;
            }
            Ok(Ok(Ok(Err(ToolError::Failed(msg))))) => {
                job.fail(JobError::failed(msg), started.elapsed())?;
            }
            Ok(Ok(Ok(Ok(output)))) => {
                let violations = call
                    .result_validator
                    .as_ref()
                    .map(|schema| schema.errors(&output))
                    .unwrap_or_default();
                if !violations.is_empty() {
                    job.fail(
                        JobError::failed(format!(
                            "result does not match resultSchema: {}",
                            violations.join("; ")
                        )),
                        started.elapsed(),
                    )?;
                } else {
                    match normalize_output(&call.plugin, &call.tool.name, output) {
                        Ok(result) => job.complete(result, started.elapsed())?,
                        Err(e) => job.fail(
                            JobError::failed(format!("unrecognized output: {}", e)),
                            started.elapsed(),
                        )?,
                    }
                }
            }
        }

        self.finish(job).await
    }

    async fn finish(&self, job: ExecutionJob) -> Result<ExecutionJob> {
        self.jobs.update(job.clone()).await?;
        match &job.error {
            None => tracing::info!(
                job_id = %job.job_id,
                plugin = %job.plugin_name,
                tool = %job.tool_name,
                execution_time = job.execution_time.unwrap_or_default(),
                "job_completed"
            ),
            Some(err) => tracing::info!(
                job_id = %job.job_id,
                plugin = %job.plugin_name,
                tool = %job.tool_name,
                status = job.status.as_str(),
                error = %err.message,
                "job_finished_with_error"
            ),
        }
        Ok(job)
    }
}
