//! Control API
//!
//! `GET /play`, `/stop` and `/status` drive the playback state machine;
//! `/health` and `/queue` are read-only views for monitoring.

pub mod error;
pub mod handlers;

use crate::engine::SyncEngine;
use crate::error::{Error, Result};
use crate::playback::PlaybackController;
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use error::{ApiError, ApiResult};

/// Shared context for all handlers
#[derive(Clone)]
pub struct AppState {
    pub playback: Arc<PlaybackController>,
    pub engine: Arc<SyncEngine>,
    /// Station name reported by `/health`
    pub stream_name: &'static str,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/play", get(handlers::play))
        .route("/stop", get(handlers::stop))
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/queue", get(handlers::queue))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the control API on all interfaces until `shutdown` resolves
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Control API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))
}
