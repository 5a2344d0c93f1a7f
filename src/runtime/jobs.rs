//! Execution jobs: lifecycle state and the in-memory job store.
//!
//! State transitions:
//! ```text
//! PENDING → RUNNING → {COMPLETED | FAILED | TIMEOUT}
//! ```
//! Terminal states are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::result::ExecutionResult;
use crate::types::{Error, JobId, Result};
use crate::upstream::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout
        )
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Timeout) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobErrorKind {
    Failed,
    Timeout,
    Upstream,
}

/// Why a job did not complete. Stored on the job, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::Failed,
            message: message.into(),
            upstream_url: None,
            upstream_status: None,
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            kind: JobErrorKind::Timeout,
            message: format!("deadline of {}ms exceeded", timeout_ms),
            upstream_url: None,
            upstream_status: None,
        }
    }

    /// An upstream timeout keeps the `timeout` kind; the URL tells it apart
    /// from the tool's own deadline.
    pub fn upstream(err: &UpstreamError) -> Self {
        Self {
            kind: if err.is_timeout() {
                JobErrorKind::Timeout
            } else {
                JobErrorKind::Upstream
            },
            message: err.detail.clone(),
            upstream_url: Some(err.upstream_url.clone()),
            upstream_status: err.status,
        }
    }
}

/// One invocation's record. Created once, never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub job_id: JobId,
    pub plugin_name: String,
    pub tool_name: String,
    pub args: Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds between start and the terminal transition.
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl ExecutionJob {
    pub fn new(job_id: JobId, plugin: &str, tool: &str, args: Value) -> Self {
        Self {
            job_id,
            plugin_name: plugin.to_string(),
            tool_name: tool.to_string(),
            args,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_time: None,
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "job {}: cannot transition {} -> {}",
                self.job_id,
                self.status.as_str(),
                to.as_str()
            )));
        }
        self.status = to;
        Ok(())
    }

    fn finish(&mut self, to: JobStatus, elapsed: Duration) -> Result<()> {
        self.transition(to)?;
        self.completed_at = Some(Utc::now());
        self.execution_time = Some(elapsed.as_secs_f64());
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, result: ExecutionResult, elapsed: Duration) -> Result<()> {
        self.finish(JobStatus::Completed, elapsed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: JobError, elapsed: Duration) -> Result<()> {
        self.finish(JobStatus::Failed, elapsed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Deadline hit. Any partial output is discarded.
    pub fn time_out(&mut self, timeout_ms: u64, elapsed: Duration) -> Result<()> {
        self.finish(JobStatus::Timeout, elapsed)?;
        self.result = None;
        self.error = Some(JobError::timeout(timeout_ms));
        Ok(())
    }
}

// =============================================================================
// Job store
// =============================================================================

/// Jobs by id. Queryable until the retention sweeper evicts them.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, ExecutionJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: ExecutionJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(Error::validation(format!("job {} already exists", job.job_id)));
        }
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    /// Replace a stored job. A terminal job can no longer change.
    pub async fn update(&self, job: ExecutionJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&job.job_id)
            .ok_or_else(|| Error::not_found(format!("job {}", job.job_id)))?;
        if stored.status.is_terminal() {
            return Err(Error::state_transition(format!(
                "job {} is already {}",
                job.job_id,
                stored.status.as_str()
            )));
        }
        *stored = job;
        Ok(())
    }

    pub async fn get(&self, job_id: &JobId) -> Option<ExecutionJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<ExecutionJob> {
        let mut jobs: Vec<ExecutionJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Remove terminal jobs that finished more than `retention` ago.
    pub async fn evict_terminal_older_than(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|t| t < cutoff))
        });
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> ExecutionJob {
        ExecutionJob::new(JobId::new(), "quotes", "lookup", json!({"ticker": "ACME"}))
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);
        job.start().unwrap();
        assert!(job.started_at.is_some());
        job.complete(ExecutionResult::default(), Duration::from_millis(250))
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.execution_time, Some(0.25));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.start().unwrap();
        job.time_out(100, Duration::from_millis(100)).unwrap();
        assert_eq!(job.error.as_ref().map(|e| e.kind), Some(JobErrorKind::Timeout));

        assert!(job.start().is_err());
        assert!(job
            .complete(ExecutionResult::default(), Duration::ZERO)
            .is_err());
        assert!(job.fail(JobError::failed("late"), Duration::ZERO).is_err());
        assert_eq!(job.status, JobStatus::Timeout);
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut job = job();
        let err = job
            .complete(ExecutionResult::default(), Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.code(), "FAILED_PRECONDITION");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(JobStatus::Timeout).unwrap(), json!("timeout"));
    }

    #[tokio::test]
    async fn test_store_insert_update_get() {
        let store = JobStore::new();
        let mut job = job();
        store.insert(job.clone()).await.unwrap();
        assert!(store.insert(job.clone()).await.is_err());

        job.start().unwrap();
        job.fail(JobError::failed("boom"), Duration::from_millis(5))
            .unwrap();
        store.update(job.clone()).await.unwrap();

        let stored = store.get(&job.job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        // Terminal jobs are frozen.
        assert!(store.update(job).await.is_err());
    }

    #[tokio::test]
    async fn test_evict_terminal_only() {
        let store = JobStore::new();
        let pending = job();
        let mut done = job();
        done.start().unwrap();
        done.complete(ExecutionResult::default(), Duration::ZERO)
            .unwrap();
        done.completed_at = Some(Utc::now() - chrono::Duration::hours(2));
        store.insert(pending.clone()).await.unwrap();
        store.insert(done).await.unwrap();

        assert_eq!(
            store
                .evict_terminal_older_than(Duration::from_secs(3600))
                .await,
            1
        );
        assert_eq!(store.len().await, 1);
        assert!(store.get(&pending.job_id).await.is_some());
    }
}
