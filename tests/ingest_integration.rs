//! Integration tests for delivery, spill and replay against the reference sink.

use chrono::Utc;
use jeeves_plugin_runtime::http::sink_router;
use jeeves_plugin_runtime::ingest::{
    IngestReceipt, IngestionSinkClient, PluginRunPayload, SeenSetStore, SpillReplayService,
    SpillStore, ThreatIndicator,
};
use jeeves_plugin_runtime::runtime::{GraphEntity, JobStatus};
use jeeves_plugin_runtime::types::HttpClientConfig;
use jeeves_plugin_runtime::upstream::ResilientHttpClient;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::Instant;

async fn start_sink() -> (String, Arc<SeenSetStore>) {
    let store = Arc::new(SeenSetStore::new());
    let app = sink_router(Arc::clone(&store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), store)
}

/// An address nothing listens on.
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn client(base_url: Option<String>, spill: &TempDir) -> IngestionSinkClient {
    let http = ResilientHttpClient::from_config(&HttpClientConfig::default()).unwrap();
    IngestionSinkClient::new(http, base_url, SpillStore::new(spill.path().to_path_buf()))
}

fn indicator(value: &str) -> ThreatIndicator {
    ThreatIndicator {
        indicator: value.to_string(),
        indicator_type: "ipv4".to_string(),
        source: "honeypot".to_string(),
        first_seen: Some(Utc::now()),
        tags: vec!["scanner".to_string()],
    }
}

fn payload(job_id: &str) -> PluginRunPayload {
    PluginRunPayload {
        job_id: job_id.to_string(),
        plugin_name: "quotes".to_string(),
        status: JobStatus::Completed,
        completed_at: Some(Utc::now()),
        execution_time: Some(0.2),
        graph_entities: vec![GraphEntity {
            entity_type: "ticker".to_string(),
            id: "ACME".to_string(),
            properties: Map::new(),
        }],
        search_documents: vec![json!({"id": "acme-news", "content": "ACME rallies"})],
    }
}

#[tokio::test]
async fn test_indicators_are_idempotent() {
    let (base, store) = start_sink().await;
    let spill = TempDir::new().unwrap();
    let client = client(Some(base), &spill);

    let first = client
        .ingest_threat_indicators(&[indicator("203.0.113.7")])
        .await
        .unwrap();
    assert_eq!(first, IngestReceipt::Delivered { ingested: 1 });

    let second = client
        .ingest_threat_indicators(&[indicator("203.0.113.7")])
        .await
        .unwrap();
    assert_eq!(second, IngestReceipt::Delivered { ingested: 0 });
    assert_eq!(store.indicator_count().await, 1);
}

#[tokio::test]
async fn test_plugin_run_redelivery_counts_zero() {
    let (base, store) = start_sink().await;
    let spill = TempDir::new().unwrap();
    let client = client(Some(base), &spill);

    let first = client.ingest_execution_result(&payload("job-1")).await.unwrap();
    assert_eq!(first, IngestReceipt::Delivered { ingested: 2 });
    let again = client.ingest_execution_result(&payload("job-1")).await.unwrap();
    assert_eq!(again, IngestReceipt::Delivered { ingested: 0 });
    assert_eq!(store.plugin_record_count().await, 2);
}

#[tokio::test]
async fn test_unreachable_sink_spills_then_replays() {
    let spill = TempDir::new().unwrap();
    let offline = client(Some(dead_address().await), &spill);

    let receipt = offline.ingest_execution_result(&payload("job-2")).await.unwrap();
    assert!(receipt.is_spilled());
    let receipt = offline
        .ingest_threat_indicators(&[indicator("198.51.100.1"), indicator("198.51.100.2")])
        .await
        .unwrap();
    assert!(receipt.is_spilled());
    assert_eq!(offline.spill_store().list().unwrap().len(), 2);

    // Still down: nothing is lost.
    let paused = offline.replay_spilled().await.unwrap();
    assert_eq!(paused.delivered, 0);
    assert_eq!(paused.remaining, 2);

    let (base, store) = start_sink().await;
    let online = client(Some(base), &spill);
    let report = online.replay_spilled().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.remaining, 0);
    assert!(report.rejected.is_empty());
    assert!(online.spill_store().list().unwrap().is_empty());

    assert_eq!(store.plugin_record_count().await, 2);
    assert_eq!(store.indicator_count().await, 2);
    assert!(store.indicator("198.51.100.2").await.is_some());
}

#[tokio::test]
async fn test_no_sink_configured_spills() {
    let spill = TempDir::new().unwrap();
    let client = client(None, &spill);
    let receipt = client
        .ingest_threat_indicators(&[indicator("192.0.2.9")])
        .await
        .unwrap();
    match receipt {
        IngestReceipt::Spilled { path } => assert!(path.starts_with(spill.path())),
        other => panic!("expected spill, got {:?}", other),
    }
}

#[tokio::test]
async fn test_replay_service_delivers_spills_written_while_running() {
    let spill = TempDir::new().unwrap();
    let (base, store) = start_sink().await;
    let mut service = SpillReplayService::new(client(Some(base), &spill), Duration::from_millis(50));
    let handle = service.start();

    // First pass has nothing to do.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let offline = client(Some(dead_address().await), &spill);
    let receipt = offline.ingest_execution_result(&payload("job-3")).await.unwrap();
    assert!(receipt.is_spilled());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !offline.spill_store().list().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "spill was never replayed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(store.plugin_record_count().await, 2);

    service.stop();
    handle.await.unwrap();
}
