//! Pod Recommender - CPU and memory recommendations for Kubernetes workloads
//!
//! Periodically reads container usage histories, computes recommendations
//! and serves them together with health and Prometheus metrics.

use anyhow::{Context, Result};
use pod_recommender::{api, config::AppConfig};
use recommender_lib::{
    health::HealthRegistry,
    history::FileHistorySource,
    telemetry::CustomMetricsClient,
    PodResourceRecommender, RecommendationLoop, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RECOMMENDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pod-recommender");

    let config = AppConfig::load()?;
    info!(
        instance = %config.instance,
        history_path = %config.history_path.display(),
        metrics_api_url = %config.metrics_api_url,
        "Recommender configured"
    );

    let health_registry = HealthRegistry::with_default_components().await;
    let logger = StructuredLogger::new(&config.instance);

    let mut metrics_client = CustomMetricsClient::new(
        &config.metrics_api_url,
        config.recommender.controller.metric_timeout(),
    )
    .context("Failed to create custom metrics client")?;
    if let Some(token) = config.metrics_api_token()? {
        metrics_client = metrics_client.with_bearer_token(token);
    }

    let recommender = PodResourceRecommender::new(&config.recommender)
        .context("Invalid recommender configuration")?
        .with_metric_source(Arc::new(metrics_client))
        .with_logger(logger.clone());

    let recommendations = Arc::new(RecommendationLoop::new(
        Arc::new(recommender),
        Arc::new(FileHistorySource::new(&config.history_path)),
        health_registry.clone(),
        config.interval(),
    ));

    logger.log_startup(
        RECOMMENDER_VERSION,
        config.interval_secs,
        config.recommender.overrides.targets.len(),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let loop_handle = tokio::spawn(recommendations.clone().run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(health_registry, recommendations));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => warn!(error = %e, "API server failed"),
                Err(e) => warn!(error = %e, "API server task panicked"),
            }
        }
    }

    // Receivers may already be gone if the loop exited
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Recommendation loop task failed");
    }

    info!("Shutting down");
    Ok(())
}
