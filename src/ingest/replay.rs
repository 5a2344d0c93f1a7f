//! Periodic re-delivery of spilled payloads.
//!
//! The first pass runs as soon as the service starts, so payloads left over
//! from a previous process go out first. Later passes pick up anything
//! spilled while the process is running.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use super::client::{IngestionSinkClient, ReplayReport};

#[derive(Debug)]
pub struct SpillReplayService {
    sink: IngestionSinkClient,
    interval: Duration,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl SpillReplayService {
    pub fn new(sink: IngestionSinkClient, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            stop_tx: None,
        }
    }

    /// Start the replay loop in the background.
    pub fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let sink = self.sink.clone();
        let period = self.interval;
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::replay(&sink).await;
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("spill_replay_service_stopped");
                        break;
                    }
                }
            }
        })
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Run one pass now.
    pub async fn run_once(&self) -> Option<ReplayReport> {
        Self::replay(&self.sink).await
    }

    async fn replay(sink: &IngestionSinkClient) -> Option<ReplayReport> {
        match sink.replay_spilled().await {
            Ok(report) => {
                if report.delivered > 0 || report.remaining > 0 {
                    tracing::info!(
                        delivered = report.delivered,
                        rejected = report.rejected.len(),
                        unreadable = report.unreadable.len(),
                        remaining = report.remaining,
                        "spill_replay_complete"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "spill_replay_failed");
                None
            }
        }
    }
}

impl Drop for SpillReplayService {
    fn drop(&mut self) {
        self.stop();
    }
}
