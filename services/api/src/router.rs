//! Axum Router Configuration
//!
//! The relay exposes one WebSocket endpoint and serves the browser client's
//! static files for every other path.

use crate::{state::AppState, ws::ws_handler};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&app_state.config.static_dir);

    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(app_state)
        .fallback_service(static_files)
}
