//! Ingestion wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

use crate::runtime::jobs::{ExecutionJob, JobStatus};
use crate::runtime::result::GraphEntity;

/// Which ingestion endpoint a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestKind {
    PluginRun,
    ThreatIndicators,
}

impl IngestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestKind::PluginRun => "plugin-run",
            IngestKind::ThreatIndicators => "threat-indicators",
        }
    }

    /// Path on the sink, relative to its base URL.
    pub fn path(self) -> &'static str {
        match self {
            IngestKind::PluginRun => "/v1/ingest/plugin-run",
            IngestKind::ThreatIndicators => "/v1/ingest/threat-indicators",
        }
    }
}

impl fmt::Display for IngestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /v1/ingest/plugin-run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRunPayload {
    pub job_id: String,
    pub plugin_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub graph_entities: Vec<GraphEntity>,
    #[serde(default)]
    pub search_documents: Vec<Value>,
}

impl PluginRunPayload {
    pub fn from_job(job: &ExecutionJob) -> Self {
        let (graph_entities, search_documents) = job
            .result
            .as_ref()
            .map(|r| (r.graph_entities.clone(), r.search_documents.clone()))
            .unwrap_or_default();
        Self {
            job_id: job.job_id.to_string(),
            plugin_name: job.plugin_name.clone(),
            status: job.status,
            completed_at: job.completed_at,
            execution_time: job.execution_time,
            graph_entities,
            search_documents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIndicator {
    pub indicator: String,
    #[serde(rename = "type")]
    pub indicator_type: String,
    pub source: String,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body of `POST /v1/ingest/threat-indicators`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIndicatorBatch {
    pub items: Vec<ThreatIndicator>,
}

/// Sink reply: how many records were new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ingested: u64,
}

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestReceipt {
    Delivered { ingested: u64 },
    Spilled { path: PathBuf },
}

impl IngestReceipt {
    pub fn is_spilled(&self) -> bool {
        matches!(self, IngestReceipt::Spilled { .. })
    }
}
