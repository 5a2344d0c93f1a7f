//! Background retention sweeps.
//!
//! RetentionService periodically:
//! - evicts terminal jobs older than the configured retention
//! - prunes full, idle rate-limit buckets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::interval;

use super::jobs::JobStore;
use super::rate_limiter::RateLimiter;
use crate::types::RetentionConfig;

/// Statistics from one sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionStats {
    pub jobs_evicted: usize,
    pub buckets_pruned: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct RetentionService {
    jobs: Arc<JobStore>,
    limiter: Arc<RateLimiter>,
    config: RetentionConfig,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl RetentionService {
    pub fn new(jobs: Arc<JobStore>, limiter: Arc<RateLimiter>, config: RetentionConfig) -> Self {
        Self {
            jobs,
            limiter,
            config,
            stop_tx: None,
        }
    }

    /// Start the sweep loop in the background.
    pub fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let limiter = Arc::clone(&self.limiter);
        let config = self.config.clone();
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut ticker = interval(config.interval);
            // The first tick fires immediately; nothing to sweep yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::sweep(&jobs, &limiter, &config).await;
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("retention_service_stopped");
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

    /// Run one sweep now.
    pub async fn run_once(&self) -> RetentionStats {
        Self::sweep(&self.jobs, &self.limiter, &self.config).await
    }

    async fn sweep(jobs: &JobStore, limiter: &RateLimiter, config: &RetentionConfig) -> RetentionStats {
        let stats = RetentionStats {
            jobs_evicted: jobs.evict_terminal_older_than(config.job_retention).await,
            // A bucket idle for a whole interval and already full carries no state.
            buckets_pruned: limiter.prune_idle(config.interval).await,
            completed_at: Some(Utc::now()),
        };
        if stats.jobs_evicted > 0 || stats.buckets_pruned > 0 {
            tracing::info!(
                jobs_evicted = stats.jobs_evicted,
                buckets_pruned = stats.buckets_pruned,
                "retention_sweep_complete"
            );
        }
        stats
    }
}

impl Drop for RetentionService {
    fn drop(&mut self) {
        self.stop();
    }
}
