//! HTTP API for health checks, Prometheus metrics and recommendations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use recommender_lib::{
    health::{ComponentStatus, HealthRegistry},
    RecommendationLoop,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub recommendations: Arc<RecommendationLoop>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, recommendations: Arc<RecommendationLoop>) -> Self {
        Self {
            health_registry,
            recommendations,
        }
    }
}

/// 200 while operational (healthy or degraded), 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn list_recommendations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let recommendations = state.recommendations.latest().await;
    Json(json!({
        "total": recommendations.len(),
        "recommendations": recommendations,
    }))
}

async fn get_recommendation(
    State(state): State<Arc<AppState>>,
    Path((namespace, workload)): Path<(String, String)>,
) -> Response {
    match state.recommendations.get(&namespace, &workload).await {
        Some(recommendation) => Json(recommendation).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("no recommendation for workload {namespace}/{workload}"),
            })),
        )
            .into_response(),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/recommendations", get(list_recommendations))
        .route(
            "/recommendations/:namespace/:workload",
            get(get_recommendation),
        )
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
