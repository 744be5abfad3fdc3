//! Serving plumbing shared by the three listeners.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use beacon_controller::ControllerMetrics;
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Liveness probe.
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Readiness probe. The process serves traffic as soon as the listeners
/// are up; subscription state is eventually consistent by design.
pub async fn readyz() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

async fn metrics_handler(State(metrics): State<Arc<ControllerMetrics>>) -> Response {
    let encoder = TextEncoder::new();
    let families = metrics.registry().gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([("Content-Type", encoder.format_type().to_string())], buffer).into_response()
}

/// Router for the metrics port.
pub fn metrics_router(metrics: Arc<ControllerMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(metrics)
}

/// Resolves when the process receives SIGTERM or ctrl-c.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Window granted to in-flight responses after a shutdown signal.
const DRAIN_WINDOW: std::time::Duration = std::time::Duration::from_secs(5);

/// Serve a router until shutdown, draining in-flight responses for up to
/// [`DRAIN_WINDOW`] before abandoning them.
pub async fn serve(name: &'static str, addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(server = name, %addr, "listening");

    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!(server = name, "shutting down");
    });

    let drain_deadline = async {
        shutdown_signal().await;
        tokio::time::sleep(DRAIN_WINDOW).await;
    };

    tokio::select! {
        result = serve => result,
        () = drain_deadline => {
            info!(server = name, "drain window elapsed, abandoning in-flight requests");
            Ok(())
        }
    }
}
