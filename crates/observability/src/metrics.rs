//! Prometheus metrics infrastructure
//!
//! This module installs the Prometheus exporter and provides the metric
//! set recorded by the matchmaking core.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Initialize the Prometheus metrics exporter
///
/// Starts an HTTP listener on the given port serving `/metrics`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Matchmaking metrics
///
/// # Metrics
///
/// * `matchmaking_passes_total` - Pairing passes run
/// * `matchmaking_proposals_total` - Pairs proposed and claimed
/// * `matchmaking_matches_created_total` - Sagas that reached the notified state
/// * `matchmaking_sagas_aborted_total` - Sagas aborted before anything was recorded
/// * `matchmaking_rollbacks_total` - Sagas compensated after provisioning failed
/// * `matchmaking_compensation_failures_total` - Compensations that failed partway
/// * `matchmaking_notifications_rejected_total` - Sends the transport did not accept
/// * `matchmaking_saga_duration_seconds` - Saga wall time
/// * `matchmaking_queue_depth` - Members in the last queue snapshot
///
/// Handles are cheap to clone; without an installed recorder every call is
/// a no-op.
#[derive(Clone)]
pub struct MatchmakingMetrics {
    passes: Counter,
    proposals: Counter,
    matches_created: Counter,
    sagas_aborted: Counter,
    rollbacks: Counter,
    compensation_failures: Counter,
    notifications_rejected: Counter,
    saga_duration: Histogram,
    queue_depth: Gauge,
    domain: String,
}

impl MatchmakingMetrics {
    /// Create metrics labelled with a matching domain (e.g. "default")
    pub fn new(domain: &str) -> Self {
        let name = domain.to_string();

        Self {
            passes: counter!("matchmaking_passes_total", "domain" => name.clone()),
            proposals: counter!("matchmaking_proposals_total", "domain" => name.clone()),
            matches_created: counter!("matchmaking_matches_created_total", "domain" => name.clone()),
            sagas_aborted: counter!("matchmaking_sagas_aborted_total", "domain" => name.clone()),
            rollbacks: counter!("matchmaking_rollbacks_total", "domain" => name.clone()),
            compensation_failures: counter!(
                "matchmaking_compensation_failures_total",
                "domain" => name.clone()
            ),
            notifications_rejected: counter!(
                "matchmaking_notifications_rejected_total",
                "domain" => name.clone()
            ),
            saga_duration: histogram!("matchmaking_saga_duration_seconds", "domain" => name.clone()),
            queue_depth: gauge!("matchmaking_queue_depth", "domain" => name.clone()),
            domain: name,
        }
    }

    pub fn pass_started(&self, queue_depth: usize) {
        self.passes.increment(1);
        self.queue_depth.set(queue_depth as f64);
    }

    pub fn pair_proposed(&self) {
        self.proposals.increment(1);
    }

    pub fn match_created(&self) {
        self.matches_created.increment(1);
    }

    pub fn saga_aborted(&self) {
        self.sagas_aborted.increment(1);
    }

    pub fn saga_rolled_back(&self) {
        self.rollbacks.increment(1);
    }

    pub fn compensation_failed(&self) {
        self.compensation_failures.increment(1);
    }

    pub fn notification_rejected(&self) {
        self.notifications_rejected.increment(1);
    }

    /// Record how long a saga took
    pub fn record_saga(&self, duration: Duration) {
        self.saga_duration.record(duration.as_secs_f64());
    }

    /// Matching domain label
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Default for MatchmakingMetrics {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Records saga duration when dropped
///
/// ```ignore
/// let metrics = MatchmakingMetrics::new("default");
/// {
///     let _timer = SagaTimer::new(&metrics);
///     // ... run saga ...
/// }
/// ```
pub struct SagaTimer<'a> {
    metrics: &'a MatchmakingMetrics,
    start: Instant,
}

impl<'a> SagaTimer<'a> {
    pub fn new(metrics: &'a MatchmakingMetrics) -> Self {
        Self {
            metrics,
            start: Instant::now(),
        }
    }
}

impl Drop for SagaTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_saga(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        let metrics = MatchmakingMetrics::new("test");
        assert_eq!(metrics.domain(), "test");

        metrics.pass_started(3);
        metrics.pair_proposed();
        metrics.saga_rolled_back();
        {
            let _timer = SagaTimer::new(&metrics);
        }
    }
}
