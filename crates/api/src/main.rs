use std::net::SocketAddr;
use std::sync::Arc;

use ctlens_api::config::ServerConfig;
use ctlens_api::router::build_app_router;
use ctlens_api::state::AppState;
use ctlens_compressor::api::CompressorApi;
use ctlens_inference::api::InferenceApi;
use ctlens_pipeline::orchestrator::Orchestrator;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "ctlens_api=debug,ctlens_pipeline=debug,ctlens_inference=info,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Remote services ---
    // One connection pool shared by both clients.
    let http = reqwest::Client::new();
    let compressor = Arc::new(CompressorApi::with_client(
        http.clone(),
        &config.pipeline.compressor_url,
    ));
    let inference = Arc::new(InferenceApi::with_client(
        http,
        &config.pipeline.inference_url,
    ));

    match compressor.health().await {
        Ok(health) => tracing::info!(
            url = %compressor.api_url(),
            status = %health.status,
            version = health.version.as_deref().unwrap_or("unknown"),
            "Compression service reachable",
        ),
        Err(e) => tracing::warn!(
            url = %compressor.api_url(),
            error = %e,
            "Compression service not reachable at startup",
        ),
    }
    tracing::info!(url = %inference.analyze_url(), "Inference endpoint configured");

    // --- Orchestrator ---
    let orchestrator = Arc::new(Orchestrator::new(
        config.pipeline.clone(),
        compressor.clone(),
        inference,
    ));

    // Log job lifecycle events.
    let mut events = orchestrator.subscribe();
    let event_log_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(?event, "Scan event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        compressor,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    orchestrator.shutdown().await;
    event_log_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

/// `RUST_LOG` wins; otherwise the workspace crates log at debug.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolve on the first SIGINT or SIGTERM, logging which one arrived.
async fn shutdown_signal() {
    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutdown signal received, draining connections");
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.expect("Failed to install Ctrl-C handler");
            "SIGINT"
        }
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    "SIGINT"
}
