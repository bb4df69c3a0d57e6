use axum::{http::StatusCode, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::get_metrics;

/// Handler function for the /metrics endpoint.
pub async fn metrics_handler() -> Result<String, StatusCode> {
    let registry = match get_metrics() {
        Some(metrics) => metrics.registry().clone(),
        None => return Err(StatusCode::SERVICE_UNAVAILABLE),
    };

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&registry.gather(), &mut buffer).is_err() {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        // We allow cross-origin requests from any origin
        .layer(CorsLayer::permissive())
}

/// Start an HTTP server to expose metrics.
pub async fn start_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics available on http://{}/metrics", addr);
    axum::serve(listener, router()).await
}
