//! Logging and metrics setup.

use std::time::Duration;

use imgshift::{TransformError, TransformMetrics};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Process-wide Prometheus recorder, installed on first use.
static PROMETHEUS: Lazy<Option<PrometheusHandle>> =
    Lazy::new(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable");
            None
        }
    });

pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS.clone()
}

/// Structured JSON logs filtered by `level` (an `EnvFilter` directive).
pub fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();
}

/// Feeds pipeline outcomes into the `metrics` facade.
pub struct PrometheusTransformMetrics;

impl TransformMetrics for PrometheusTransformMetrics {
    fn record_transform(&self, latency: Duration, result: Result<(), &TransformError>) {
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("imgshift_transforms_total", "outcome" => outcome).increment(1);
        metrics::histogram!("imgshift_transform_duration_seconds").record(latency.as_secs_f64());
    }
}

pub fn record_http_request(method: &str, status: u16, latency: Duration) {
    metrics::counter!(
        "imgshift_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("imgshift_http_request_duration_seconds").record(latency.as_secs_f64());
}
