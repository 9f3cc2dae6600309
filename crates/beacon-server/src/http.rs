//! HTTP surface of the Beacon server.
//!
//! Hosts the WebSocket endpoint, the health check, and the channel
//! admin API. Admin requests are adapted onto the core's
//! transport-neutral request abstraction and dispatched through the
//! namespace registry, which delegates to the owning handler.

use crate::config::Config;
use crate::metrics;
use crate::session;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use beacon_core::{AdminRequest, Dispatcher};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared server state.
pub struct AppState {
    /// The dispatch core.
    pub dispatcher: Dispatcher,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, dispatcher: Dispatcher) -> Result<()> {
    let state = Arc::new(AppState {
        dispatcher,
        config: config.clone(),
    });

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let admin_route = format!("{}/*path", config.admin.base_path);
    let app = Router::new()
        .route("/live", get(session::ws_handler))
        .route("/health", get(health_handler))
        .route(&admin_route, get(admin_handler).post(admin_handler))
        .with_state(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Beacon server listening on {}", addr);
    info!("Live endpoint: ws://{}/live", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Channel admin handler: `{base_path}/<channel path>`.
async fn admin_handler(
    Path(path): Path<String>,
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> Response {
    let req = AdminRequest::new(method.as_str(), path, body);
    let resp = state
        .dispatcher
        .registry()
        .handle_namespace_http(&req)
        .await;

    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        resp.body,
    )
        .into_response()
}
