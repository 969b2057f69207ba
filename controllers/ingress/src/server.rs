//! Health and metrics HTTP server.
//!
//! - `GET /health`: 200 `ok` while the controller is healthy, 503 with the
//!   health error otherwise
//! - `GET /metrics`: Prometheus text format
//! - `GET /status`: lifecycle state and the last reconciliation error

use crate::controller::{Controller, LifecycleState};
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::UpdateFailure;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for handlers
#[derive(Clone)]
pub struct ServerState {
    pub controller: Arc<Controller>,
    pub metrics: Metrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    state: LifecycleState,
    last_update_error: Option<UpdateFailure>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<ServerState>) -> Response {
    match state.controller.health().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn metrics(State(state): State<ServerState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn status(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.controller.state(),
        last_update_error: state.controller.last_update_error(),
    })
}

/// Binds the server socket on all interfaces.
///
/// Kept apart from [`start_server`] so a taken port fails startup before
/// the controller touches any updater.
pub async fn bind(port: u16) -> Result<TcpListener, ControllerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind health server on {}: {}", addr, e);
        e
    })?;
    info!("Health server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serves the health endpoints on `listener` until `shutdown` completes.
pub async fn start_server<F>(
    listener: TcpListener,
    state: ServerState,
    shutdown: F,
) -> Result<(), ControllerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Health server stopped");
    Ok(())
}
