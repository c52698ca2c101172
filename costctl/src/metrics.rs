//! Prometheus metrics for cost reports.
//!
//! Registered on the default registry and served alongside the HTTP metrics from
//! axum-prometheus on `/internal/metrics`.

use axum_prometheus::{PrometheusMetricLayer, metrics_exporter_prometheus::PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{HistogramVec, IntCounterVec, register_histogram_vec, register_int_counter_vec};

/// HTTP request metrics; the exporter installs a process-wide recorder, so it is built once
static HTTP_METRICS: Lazy<(PrometheusMetricLayer<'static>, PrometheusHandle)> = Lazy::new(PrometheusMetricLayer::pair);

/// Time to build each report, including any name resolution
static REPORT_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "costctl_report_duration_seconds",
        "Time taken to compute a cost report (seconds)",
        &["report"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register costctl_report_duration_seconds metric")
});

/// Agent names resolved, by the strategy that produced them (`raw_id` for fallbacks)
static AGENT_NAMES_RESOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "costctl_agent_names_resolved_total",
        "Agent ids given a display name, by resolution strategy",
        &["strategy"]
    )
    .expect("Failed to register costctl_agent_names_resolved_total metric")
});

/// Resolution stages that failed and were skipped
static AGENT_NAME_RESOLUTION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "costctl_agent_name_resolution_failures_total",
        "Agent name resolution stages that failed and were skipped",
        &["strategy"]
    )
    .expect("Failed to register costctl_agent_name_resolution_failures_total metric")
});

pub fn record_report_duration(report: &str, seconds: f64) {
    REPORT_DURATION_SECONDS.with_label_values(&[report]).observe(seconds);
}

pub fn record_agent_names_resolved(strategy: &str, count: usize) {
    if count > 0 {
        AGENT_NAMES_RESOLVED.with_label_values(&[strategy]).inc_by(count as u64);
    }
}

pub fn record_agent_name_resolution_failure(strategy: &str) {
    AGENT_NAME_RESOLUTION_FAILURES.with_label_values(&[strategy]).inc();
}

/// Layer recording request counts and latencies, and the handle rendering them
pub fn http_metrics() -> (PrometheusMetricLayer<'static>, PrometheusHandle) {
    HTTP_METRICS.clone()
}

/// Encode the default registry in the Prometheus text format
pub fn render() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode cost report metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_rendered() {
        record_agent_names_resolved("direct_id", 2);
        record_agent_name_resolution_failure("model_match");
        record_report_duration("summary", 0.01);

        let rendered = render();
        assert!(rendered.contains("costctl_agent_names_resolved_total"));
        assert!(rendered.contains("costctl_agent_name_resolution_failures_total"));
        assert!(rendered.contains("costctl_report_duration_seconds"));
    }
}
