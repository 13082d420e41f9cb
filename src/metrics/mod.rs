use crate::error::{GuardError, Result};
use axum::{
    body::Body,
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::info;

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GuardError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "guard_requests_blocked_total",
            "Requests rejected by the security filter, by violation kind"
        );
        describe_counter!(
            "guard_rate_limit_exceeded_total",
            "Requests rejected due to rate limiting, by bucket"
        );
        describe_counter!(
            "guard_counter_store_failures_total",
            "Counter store calls that failed or timed out"
        );
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    let metrics = service.render();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(Body::from(metrics))
        .unwrap()
}

/// Record a security filter rejection
pub fn record_request_blocked(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!("guard_requests_blocked_total", &labels).increment(1);
}

/// Record a rate limit denial
pub fn record_rate_limit_denied(bucket: &str) {
    let labels = [("bucket", bucket.to_string())];
    counter!("guard_rate_limit_exceeded_total", &labels).increment(1);
}

/// Record a counter store failure
pub fn record_store_failure() {
    counter!("guard_counter_store_failures_total").increment(1);
}
