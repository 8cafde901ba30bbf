//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::poller;
use crate::state::AppState;
use crate::ws;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // API routes
        .route("/api/status", get(api::get_status))
        .route("/api/devices", get(api::list_devices))
        .route("/api/devices/{name}", get(api::get_device))
        .route("/api/devices/{name}/{attribute}", put(api::write_attribute))
        .route("/api/actions/{action}", post(api::run_action))
        .route("/api/raw", post(api::send_raw))
        .route("/api/scan", post(api::trigger_scan))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start discovery and optional power polling in the background
pub fn spawn_background(state: &Arc<AppState>) {
    state.discovery.spawn();

    let polling = &state.config.polling;
    if polling.power_states {
        let monitor = Arc::clone(&state.monitor);
        let period = Duration::from_secs(polling.interval_secs.max(1));
        tokio::spawn(poller::run(monitor, period));
    }
}

/// Run the web server until `shutdown` resolves
pub async fn run(
    state: Arc<AppState>,
    bind: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
