//! Background queue worker
//!
//! Drains the matching queue on a fixed interval (and optionally once at
//! startup) until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use config::WorkerConfig;

use crate::service::MatchingService;

pub struct QueueWorker {
    service: Arc<MatchingService>,
    interval: Duration,
    run_on_startup: bool,
}

impl QueueWorker {
    pub fn new(service: Arc<MatchingService>, config: &WorkerConfig) -> Self {
        Self {
            service,
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            run_on_startup: config.run_on_startup,
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting QueueWorker for domain '{}' (interval={}s, run_on_startup={})",
            self.service.domain(),
            self.interval.as_secs(),
            self.run_on_startup
        );

        if self.run_on_startup {
            info!("Running initial matching pass...");
            self.run_cycle().await;
        }

        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = timer.tick() => self.run_cycle().await,
                _ = shutdown.cancelled() => {
                    info!("QueueWorker shutting down.");
                    return;
                }
            }
        }
    }

    /// Drain the queue once, logging the result
    pub async fn run_cycle(&self) {
        match self.service.process_matching_queue().await {
            Ok(summary) if summary.proposed == 0 => debug!("Matching pass found no pairs"),
            Ok(summary) => {
                for e in &summary.errors {
                    error!("Match attempt failed: {}", e);
                }
            }
            Err(e) => error!("Matching pass failed: {}", e),
        }
    }
}
