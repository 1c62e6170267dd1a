//! Decision-path metrics with Prometheus text export

use crate::types::Verdict;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Snapshot of decision-path counters
#[derive(Debug, Clone, Default)]
pub struct DecisionMetrics {
    pub total_decisions: u64,
    pub allowed: u64,
    pub denied: u64,
    pub step_up_required: u64,
    /// Remote grant fetches that timed out or failed (each is a fail-closed
    /// deny, also counted under `denied`)
    pub upstream_failures: u64,
    pub policy_breaches: u64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_latency_ms: f64,
}

impl DecisionMetrics {
    pub fn allow_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.allowed as f64 / self.total_decisions as f64
        }
    }
}

/// Collects decision counters and latency samples
pub struct MetricsCollector {
    metrics: Arc<RwLock<DecisionMetrics>>,
    latency_samples: Arc<RwLock<Vec<f64>>>,
    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(DecisionMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    pub async fn record_verdict(&self, verdict: Verdict) {
        let mut metrics = self.metrics.write().await;
        metrics.total_decisions += 1;
        match verdict {
            Verdict::Allow => metrics.allowed += 1,
            Verdict::Deny => metrics.denied += 1,
            Verdict::StepUpRequired => metrics.step_up_required += 1,
        }
    }

    pub async fn record_upstream_failure(&self) {
        self.metrics.write().await.upstream_failures += 1;
    }

    pub async fn record_policy_breach(&self) {
        self.metrics.write().await.policy_breaches += 1;
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut metrics = self.metrics.write().await;
        let sum: f64 = samples.iter().sum();
        metrics.avg_latency_ms = sum / samples.len() as f64;

        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p95_ms = Self::percentile(&sorted, 0.95);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    pub async fn snapshot(&self) -> DecisionMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = DecisionMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Render the counters in Prometheus exposition format.
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP authz_decisions_total Total authorization decisions
# TYPE authz_decisions_total counter
authz_decisions_total {}

# HELP authz_allowed_total Allowed decisions
# TYPE authz_allowed_total counter
authz_allowed_total {}

# HELP authz_denied_total Denied decisions
# TYPE authz_denied_total counter
authz_denied_total {}

# HELP authz_step_up_total Decisions requiring step-up verification
# TYPE authz_step_up_total counter
authz_step_up_total {}

# HELP authz_upstream_failures_total Remote grant fetches that failed or timed out
# TYPE authz_upstream_failures_total counter
authz_upstream_failures_total {}

# HELP authz_policy_breaches_total Enforced policy breaches
# TYPE authz_policy_breaches_total counter
authz_policy_breaches_total {}

# HELP authz_decision_latency_seconds Decision latency percentiles
# TYPE authz_decision_latency_seconds summary
authz_decision_latency_seconds{{quantile="0.5"}} {}
authz_decision_latency_seconds{{quantile="0.95"}} {}
authz_decision_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.total_decisions,
            metrics.allowed,
            metrics.denied,
            metrics.step_up_required,
            metrics.upstream_failures,
            metrics.policy_breaches,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p95_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_verdict_counters() {
        let collector = MetricsCollector::new();
        collector.record_verdict(Verdict::Allow).await;
        collector.record_verdict(Verdict::Deny).await;
        collector.record_verdict(Verdict::StepUpRequired).await;
        collector.record_verdict(Verdict::Allow).await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.total_decisions, 4);
        assert_eq!(metrics.allowed, 2);
        assert_eq!(metrics.denied, 1);
        assert_eq!(metrics.step_up_required, 1);
        assert!((metrics.allow_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_latency_percentiles() {
        let collector = MetricsCollector::new();
        for ms in [5u64, 10, 15] {
            collector.record_latency(Duration::from_millis(ms)).await;
        }

        let metrics = collector.snapshot().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p50_ms > 0.0);
        assert!(metrics.latency_p99_ms >= metrics.latency_p50_ms);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();
        collector.record_verdict(Verdict::Allow).await;
        collector.record_upstream_failure().await;

        let text = collector.export_prometheus().await;
        assert!(text.contains("authz_decisions_total 1"));
        assert!(text.contains("authz_upstream_failures_total 1"));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_verdict(Verdict::Deny).await;
        collector.reset().await;
        assert_eq!(collector.snapshot().await.total_decisions, 0);
    }
}
