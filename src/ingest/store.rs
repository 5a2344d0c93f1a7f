//! In-memory reference sink with seen-set deduplication.
//!
//! Records are keyed by their natural key and never overwritten: a repeat
//! delivery is accepted and reports zero new records.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::{IngestResponse, PluginRunPayload, ThreatIndicator};

/// `(plugin_name, "type:id" | "doc:<id>")`
type RunKey = (String, String);

#[derive(Debug, Default)]
pub struct SeenSetStore {
    plugin_records: RwLock<HashMap<RunKey, Value>>,
    indicators: RwLock<HashMap<String, ThreatIndicator>>,
}

impl SeenSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn document_key(doc: &Value) -> String {
        match doc.get("id") {
            Some(Value::String(id)) => format!("doc:{}", id),
            Some(Value::Number(id)) => format!("doc:{}", id),
            // serde_json maps keep keys sorted, so this text is canonical.
            _ => format!("doc:{}", doc),
        }
    }

    pub async fn ingest_plugin_run(&self, payload: &PluginRunPayload) -> IngestResponse {
        let mut records = self.plugin_records.write().await;
        let mut ingested = 0;

        let entities = payload.graph_entities.iter().map(|entity| {
            let record = serde_json::to_value(entity).unwrap_or(Value::Null);
            (entity.natural_key(), record)
        });
        let documents = payload
            .search_documents
            .iter()
            .map(|doc| (Self::document_key(doc), doc.clone()));

        for (key, record) in entities.chain(documents) {
            let key = (payload.plugin_name.clone(), key);
            if let std::collections::hash_map::Entry::Vacant(slot) = records.entry(key) {
                slot.insert(record);
                ingested += 1;
            }
        }

        tracing::debug!(
            plugin = %payload.plugin_name,
            job_id = %payload.job_id,
            ingested,
            "sink_plugin_run_ingested"
        );
        IngestResponse { ingested }
    }

    pub async fn ingest_threat_indicators(&self, items: &[ThreatIndicator]) -> IngestResponse {
        let mut indicators = self.indicators.write().await;
        let mut ingested = 0;
        for item in items {
            if !indicators.contains_key(&item.indicator) {
                indicators.insert(item.indicator.clone(), item.clone());
                ingested += 1;
            }
        }
        IngestResponse { ingested }
    }

    pub async fn plugin_record_count(&self) -> usize {
        self.plugin_records.read().await.len()
    }

    pub async fn indicator_count(&self) -> usize {
        self.indicators.read().await.len()
    }

    pub async fn indicator(&self, value: &str) -> Option<ThreatIndicator> {
        self.indicators.read().await.get(value).cloned()
    }
}
