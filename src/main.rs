//! Churn Prediction Service - Main Entry Point
//!
//! Loads the fitted artifacts of both industries and serves predictions over HTTP.

use anyhow::{Context, Result};
use churn_prediction_service::{
    config::AppConfig,
    http,
    logging,
    metrics::{MetricsReporter, ServiceMetrics},
    models::{ArtifactStore, PredictionContext},
    service::PredictionService,
    store::FeatureTableStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.logging)?;

    info!("Starting Churn Prediction Service");
    info!(
        medium = config.scoring.risk_levels.medium,
        high = config.scoring.risk_levels.high,
        "Risk tiers: High above high, Medium above medium"
    );

    // Missing or incompatible artifacts stop the server before it binds
    let artifacts = ArtifactStore::new(&config.artifacts.dir);
    let context = PredictionContext::load(&artifacts).with_context(|| {
        format!(
            "Failed to load model artifacts from {}",
            config.artifacts.dir.display()
        )
    })?;

    let metrics = Arc::new(ServiceMetrics::new());
    let service = PredictionService::new(
        Arc::new(context),
        FeatureTableStore::new(&config.storage.data_dir),
        config.scoring.risk_levels,
    )?
    .with_metrics(metrics.clone());
    info!(data_dir = %config.storage.data_dir.display(), "Feature table store ready");

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let app = http::router(Arc::new(service), &config.server.allowed_origins);

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(address = %address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Service shutting down...");
    metrics.print_summary();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
