//! HTTP request handlers
//!
//! Control verbs are plain GETs so a browser bookmark or a home-automation
//! webhook can drive them.

use super::error::ApiResult;
use super::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use vjn_common::{PlaybackState, QueueRecord};

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: PlaybackState,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    module: &'static str,
    version: &'static str,
    backend: &'static str,
    stream: &'static str,
    queued: usize,
    last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    tracks: Vec<QueueRecord>,
}

/// GET /play
pub async fn play(State(ctx): State<AppState>) -> ApiResult<Json<StateResponse>> {
    info!("Play requested");
    let state = ctx.playback.play().await?;
    Ok(Json(StateResponse { state }))
}

/// GET /stop
pub async fn stop(State(ctx): State<AppState>) -> ApiResult<Json<StateResponse>> {
    info!("Stop requested");
    let state = ctx.playback.stop().await?;
    Ok(Json(StateResponse { state }))
}

/// GET /status
pub async fn status(State(ctx): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        state: ctx.playback.status(),
    })
}

/// GET /health
pub async fn health(State(ctx): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: "vjn-sync",
        version: env!("CARGO_PKG_VERSION"),
        backend: ctx.engine.downstream_name(),
        stream: ctx.stream_name,
        queued: ctx.engine.snapshot().len(),
        last_sync: ctx.engine.last_sync(),
    })
}

/// GET /queue
pub async fn queue(State(ctx): State<AppState>) -> Json<QueueResponse> {
    Json(QueueResponse {
        tracks: ctx.engine.snapshot(),
    })
}
