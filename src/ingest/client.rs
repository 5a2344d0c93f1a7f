//! Ingestion sink client: deliver or spill, never drop.
//!
//! "Unreachable" means a transport failure or a 5xx reply; those payloads go
//! to the spill directory and can be replayed later. A 4xx reply is a
//! rejection and surfaces as [`Error::SinkRejected`].

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use super::spill::SpillStore;
use super::types::{IngestKind, IngestReceipt, IngestResponse, PluginRunPayload, ThreatIndicator, ThreatIndicatorBatch};
use crate::types::{Error, Result};
use crate::upstream::{RequestOptions, ResilientHttpClient};

enum Delivery {
    Delivered(u64),
    Unreachable(String),
}

/// Outcome of a replay pass.
///
/// `remaining` counts every spill file still on disk afterwards: the ones
/// rejected, the unreadable ones and the ones not attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub delivered: usize,
    pub rejected: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct IngestionSinkClient {
    http: ResilientHttpClient,
    base_url: Option<String>,
    spill: SpillStore,
}

impl IngestionSinkClient {
    /// `base_url = None` spills every payload.
    pub fn new(http: ResilientHttpClient, base_url: Option<String>, spill: SpillStore) -> Self {
        Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            spill,
        }
    }

    pub fn spill_store(&self) -> &SpillStore {
        &self.spill
    }

    pub async fn ingest_execution_result(&self, payload: &PluginRunPayload) -> Result<IngestReceipt> {
        let body = serde_json::to_value(payload)?;
        self.deliver_or_spill(IngestKind::PluginRun, Some(&payload.job_id), body)
            .await
    }

    pub async fn ingest_threat_indicators(&self, items: &[ThreatIndicator]) -> Result<IngestReceipt> {
        let body = serde_json::to_value(ThreatIndicatorBatch {
            items: items.to_vec(),
        })?;
        self.deliver_or_spill(IngestKind::ThreatIndicators, None, body)
            .await
    }

    async fn deliver(&self, kind: IngestKind, body: &Value) -> Result<Delivery> {
        let Some(base_url) = &self.base_url else {
            return Ok(Delivery::Unreachable("no sink configured".to_string()));
        };
        let url = format!("{}{}", base_url, kind.path());

        let response = match self
            .http
            .request(Method::POST, &url, RequestOptions::new().json(body.clone()))
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(Delivery::Unreachable(e.to_string())),
        };
        if response.is_server_error() {
            return Ok(Delivery::Unreachable(format!(
                "sink returned {}: {}",
                response.status,
                response.text()
            )));
        }
        if !response.is_success() {
            return Err(Error::SinkRejected {
                status: response.status,
                detail: response.text(),
            });
        }
        let reply: IngestResponse = response.json()?;
        Ok(Delivery::Delivered(reply.ingested))
    }

    async fn deliver_or_spill(
        &self,
        kind: IngestKind,
        key: Option<&str>,
        body: Value,
    ) -> Result<IngestReceipt> {
        match self.deliver(kind, &body).await? {
            Delivery::Delivered(ingested) => {
                tracing::debug!(kind = %kind, ingested, "ingest_delivered");
                Ok(IngestReceipt::Delivered { ingested })
            }
            Delivery::Unreachable(reason) => {
                let spill = self.spill.clone();
                let key = key.map(str::to_string);
                let path = tokio::task::spawn_blocking(move || {
                    spill.write(kind, key.as_deref(), &body)
                })
                .await
                .map_err(|e| Error::internal(format!("spill task failed: {}", e)))??;
                tracing::warn!(
                    kind = %kind,
                    path = %path.display(),
                    reason = %reason,
                    "ingest_spilled"
                );
                Ok(IngestReceipt::Spilled { path })
            }
        }
    }

    /// Re-deliver spilled payloads in name order, deleting each after
    /// delivery. Stops at the first delivery that is still unreachable.
    /// Rejected and unreadable files are left in place and reported.
    pub async fn replay_spilled(&self) -> Result<ReplayReport> {
        let files = self.spill.list()?;
        let mut report = ReplayReport::default();

        for (index, path) in files.iter().enumerate() {
            let record = match SpillStore::read(path) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "spill_unreadable");
                    report.unreadable.push(path.clone());
                    continue;
                }
            };
            match self.deliver(record.kind, &record.payload).await {
                Ok(Delivery::Delivered(ingested)) => {
                    SpillStore::remove(path)?;
                    report.delivered += 1;
                    tracing::info!(path = %path.display(), ingested, "spill_replayed");
                }
                Ok(Delivery::Unreachable(reason)) => {
                    report.remaining = report.skipped() + (files.len() - index);
                    tracing::warn!(reason = %reason, remaining = report.remaining, "spill_replay_paused");
                    return Ok(report);
                }
                Err(Error::SinkRejected { status, detail }) => {
                    tracing::error!(path = %path.display(), status, detail = %detail, "spill_rejected");
                    report.rejected.push(path.clone());
                }
                Err(other) => return Err(other),
            }
        }
        report.remaining = report.skipped();
        Ok(report)
    }
}

impl ReplayReport {
    fn skipped(&self) -> usize {
        self.rejected.len() + self.unreadable.len()
    }
}
