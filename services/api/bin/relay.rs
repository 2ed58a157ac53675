//! Main Entrypoint for the Gemini Live Relay
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Checking that the system instructions are readable.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use relay_api::{config::Config, router::create_router, state::AppState};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // Upstream connections are TLS; the provider must be in place before the first session.
    gemini_realtime::install_crypto_provider();

    // Instructions are re-read for every session; a missing file only fails sessions.
    if tokio::fs::metadata(&config.system_prompt_path).await.is_err() {
        warn!(
            path = %config.system_prompt_path.display(),
            "System prompt not found. Sessions will fail until it exists."
        );
    }

    let app_state = Arc::new(AppState::new(config.clone()));

    // --- 3. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 4. Start Server ---
    info!(
        model = %config.gemini_model,
        endpoint = %config.gemini_endpoint,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
