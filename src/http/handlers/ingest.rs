//! Reference ingestion sink handlers.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::ingest::{IngestResponse, PluginRunPayload, SeenSetStore, ThreatIndicatorBatch};

pub async fn ingest_plugin_run(
    State(store): State<Arc<SeenSetStore>>,
    Json(payload): Json<PluginRunPayload>,
) -> Json<IngestResponse> {
    Json(store.ingest_plugin_run(&payload).await)
}

pub async fn ingest_threat_indicators(
    State(store): State<Arc<SeenSetStore>>,
    Json(batch): Json<ThreatIndicatorBatch>,
) -> Json<IngestResponse> {
    let response = store.ingest_threat_indicators(&batch.items).await;
    tracing::debug!(
        received = batch.items.len(),
        ingested = response.ingested,
        "sink_indicators_ingested"
    );
    Json(response)
}
