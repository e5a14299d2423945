use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use iris_client::{CssExtractor, JsonFileSink, ReqwestFetcher};
use iris_core::models::Target;
use iris_core::{Acquisition, DeliveryBridge, ExtractionSchema, Poller, PollerConfig, TargetSource};
use iris_server::display::DisplayConsumer;
use iris_server::routes;
use iris_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("iris=info".parse()?))
        .with_target(false)
        .init();

    let api_key = std::env::var("IRIS_SERVER_API_KEY").ok();
    if api_key.is_none() {
        tracing::warn!("IRIS_SERVER_API_KEY not set, manual trigger disabled");
    }
    let port = std::env::var("IRIS_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = PollerConfig::from_env()?;
    config.validate()?;

    let schema_path = std::env::var("IRIS_SCHEMA")
        .context("IRIS_SCHEMA not set. Required path to the extraction schema.")?;
    let schema = ExtractionSchema::load(&PathBuf::from(schema_path))?;
    let output_dir = std::env::var("IRIS_OUTPUT_DIR").unwrap_or_else(|_| ".".to_string());

    let acquisition = Acquisition::with_sink(
        target_source_from_env()?,
        schema,
        ReqwestFetcher::new()?,
        CssExtractor::new(),
        JsonFileSink::new(output_dir),
        config.concurrency_limit,
    )?;

    let (tx, rx) = DeliveryBridge::channel(config.delivery_capacity);
    let (display, display_rx) = DisplayConsumer::new();
    let consumer_shutdown = CancellationToken::new();
    let consumer = tokio::spawn(rx.run_until(display, consumer_shutdown.clone()));

    let poller = Poller::new(acquisition, config, tx);
    poller.start();

    let state = Arc::new(AppState {
        poller: Arc::new(poller.clone()),
        display: display_rx,
        api_key,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.stop();
    poller.stopped().await;
    consumer_shutdown.cancel();
    let _ = consumer.await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// `IRIS_TARGETS` (file, re-read every batch) or `IRIS_URLS` (comma-separated).
fn target_source_from_env() -> anyhow::Result<TargetSource> {
    if let Ok(path) = std::env::var("IRIS_TARGETS") {
        return Ok(TargetSource::File(PathBuf::from(path)));
    }
    let urls = std::env::var("IRIS_URLS")
        .context("Neither IRIS_TARGETS nor IRIS_URLS is set. One is required.")?;
    let targets: Vec<Target> = urls
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(Target::url)
        .collect();
    anyhow::ensure!(!targets.is_empty(), "IRIS_URLS contains no URLs");
    Ok(TargetSource::Static(targets))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
