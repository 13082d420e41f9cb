pub mod client_ip;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod security;

use crate::config::GuardConfig;
use crate::error::Result;
use crate::metrics::{metrics_handler, MetricsService};
use crate::pipeline::DefensePipeline;
use axum::{routing::get, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Initialize and serve the defended application.
///
/// Business routes come from the rest of the service; here the pipeline wraps
/// a health endpoint and the metrics exporter so the binary is useful on its
/// own and serves as the wiring reference for embedders.
pub async fn init_guard(config: GuardConfig) -> Result<()> {
    config.validate()?;

    info!("Starting request defense pipeline");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let pipeline = DefensePipeline::from_config(&config).await?;
    let metrics = MetricsService::new()?;

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler).with_state(metrics));
    let app = pipeline.apply(app).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(crate::error::GuardError::Io)?;

    info!("Defense pipeline ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| crate::error::GuardError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canteen_guard=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
