//! Prometheus metrics and a simple health status: counters for the
//! certificate and agent fleet lifecycle (issuance, renewal, heartbeats).

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Coarse health summary, exposed over the agent control plane's
/// `/health`-style endpoint.
#[derive(Debug, Clone, Copy)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Metrics registry wrapper: every counter/gauge spec §2's ambient stack
/// calls for (issuance, renewal, agent heartbeats, task-log subscribers).
pub struct MetricsRegistry {
    registry: Registry,
    pub issuance_attempts_total: IntCounter,
    pub issuance_successes_total: IntCounter,
    pub issuance_failures_total: IntCounter,
    pub renewal_attempts_total: IntCounter,
    pub renewal_successes_total: IntCounter,
    pub renewal_failures_total: IntCounter,
    pub agent_heartbeats_total: IntCounter,
    pub task_log_subscribers: IntGauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let issuance_attempts_total =
            IntCounter::new("letsync_issuance_attempts_total", "Total certificate issuance attempts").unwrap();
        let issuance_successes_total =
            IntCounter::new("letsync_issuance_successes_total", "Total successful certificate issuances").unwrap();
        let issuance_failures_total =
            IntCounter::new("letsync_issuance_failures_total", "Total failed certificate issuances").unwrap();
        let renewal_attempts_total =
            IntCounter::new("letsync_renewal_attempts_total", "Total certificate renewal attempts").unwrap();
        let renewal_successes_total =
            IntCounter::new("letsync_renewal_successes_total", "Total successful certificate renewals").unwrap();
        let renewal_failures_total =
            IntCounter::new("letsync_renewal_failures_total", "Total failed certificate renewals").unwrap();
        let agent_heartbeats_total =
            IntCounter::new("letsync_agent_heartbeats_total", "Total agent heartbeats received").unwrap();
        let task_log_subscribers =
            IntGauge::new("letsync_task_log_subscribers", "Current live task-log SSE subscribers").unwrap();

        registry.register(Box::new(issuance_attempts_total.clone())).unwrap();
        registry.register(Box::new(issuance_successes_total.clone())).unwrap();
        registry.register(Box::new(issuance_failures_total.clone())).unwrap();
        registry.register(Box::new(renewal_attempts_total.clone())).unwrap();
        registry.register(Box::new(renewal_successes_total.clone())).unwrap();
        registry.register(Box::new(renewal_failures_total.clone())).unwrap();
        registry.register(Box::new(agent_heartbeats_total.clone())).unwrap();
        registry.register(Box::new(task_log_subscribers.clone())).unwrap();

        Self {
            registry,
            issuance_attempts_total,
            issuance_successes_total,
            issuance_failures_total,
            renewal_attempts_total,
            renewal_successes_total,
            renewal_failures_total,
            agent_heartbeats_total,
            task_log_subscribers,
        }
    }

    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn health_status(status: HealthStatus) -> (&'static str, u16) {
    match status {
        HealthStatus::Healthy => ("ok", 200),
        HealthStatus::Degraded => ("degraded", 200),
        HealthStatus::Unhealthy => ("unhealthy", 503),
    }
}

/// Shared metrics handle, cloned into every router/scheduler that records
/// counters.
pub type SharedMetrics = Arc<MetricsRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero_and_increment() {
        let metrics = MetricsRegistry::new();
        metrics.issuance_attempts_total.inc();
        metrics.renewal_successes_total.inc_by(2);
        let text = metrics.gather_text();
        assert!(text.contains("letsync_issuance_attempts_total 1"));
        assert!(text.contains("letsync_renewal_successes_total 2"));
    }
}
