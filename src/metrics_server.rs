// HTTP server for the Prometheus metrics endpoint
//
// Routes:
// - /metrics                       Prometheus text format
// - /health                        liveness
// - /customers/{customer_id}/quotas  quota overview for one customer (JSON)

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::metrics;
use crate::rate_limit::overview::OverviewBuilder;
use crate::rate_limit::QuotaStore;

#[derive(Debug, Deserialize)]
struct OverviewParams {
    threshold: Option<f64>,
}

/// Build the router serving metrics and quota overviews
pub fn router(store: Arc<dyn QuotaStore>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/customers/{customer_id}/quotas", get(overview_handler))
        .with_state(store)
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(port: u16, store: Arc<dyn QuotaStore>) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind metrics server")?;

    axum::serve(listener, router(store))
        .await
        .context("Metrics server error")?;

    Ok(())
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn overview_handler(
    State(store): State<Arc<dyn QuotaStore>>,
    Path(customer_id): Path<String>,
    Query(params): Query<OverviewParams>,
) -> Response {
    let mut builder = OverviewBuilder::new(store.as_ref());
    if let Some(threshold) = params.threshold {
        builder = builder.threshold(threshold);
    }

    match builder.build(&customer_id).await {
        Ok(overview) => Json(overview).into_response(),
        Err(e) => {
            error!(customer_id = %customer_id, "Failed to build quota overview: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
