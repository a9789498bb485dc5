//! Mopidy JSON-RPC client
//!
//! Mopidy plays the queue into an Icecast stream. Searches are restricted to
//! its Spotify backend so resolved URIs are playable.

use super::DownstreamQueue;
use crate::error::{Error, Result};
use crate::resolver::{TrackCandidate, TrackSearch};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use vjn_common::{QueueRecord, ResolvedTrack};

const SEARCH_URI_SCHEME: &str = "spotify:";

/// Mopidy client errors
#[derive(Debug, Error)]
pub enum MopidyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("RPC error in {method}: {message}")]
    Rpc { method: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct MopidyArtist {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct MopidyTrack {
    uri: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<MopidyArtist>,
}

pub struct MopidyClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl MopidyClient {
    /// Client for the RPC endpoint at `url` (`http://host:port/mopidy/rpc`)
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Invoke one JSON-RPC 2.0 method; returns its `result` (null when absent)
    pub async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, MopidyError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method = %method, id, "Mopidy RPC call");

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MopidyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MopidyError::Status(status.as_u16()));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| MopidyError::Parse(e.to_string()))?;

        if let Some(error) = body.error {
            let message = match error.data {
                Some(data) => format!("{} ({})", error.message, data),
                None => error.message,
            };
            return Err(MopidyError::Rpc {
                method: method.to_string(),
                message,
            });
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Poll the server until it answers, up to `attempts` times
    pub async fn wait_until_ready(&self, attempts: u32, delay: Duration) -> bool {
        for attempt in 1..=attempts.max(1) {
            match self.call("core.playback.get_state", json!({})).await {
                Ok(_) => {
                    info!("Mopidy is ready");
                    return true;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Mopidy not ready yet");
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        warn!(attempts, "Mopidy did not become ready");
        false
    }

    pub async fn playback_state(&self) -> std::result::Result<String, MopidyError> {
        let state = self.call("core.playback.get_state", json!({})).await?;
        Ok(state.as_str().unwrap_or_default().to_string())
    }

    pub async fn tracklist_length(&self) -> std::result::Result<u64, MopidyError> {
        let length = self.call("core.tracklist.get_length", json!({})).await?;
        Ok(length.as_u64().unwrap_or(0))
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<TrackCandidate>, MopidyError> {
        let results = self
            .call(
                "core.library.search",
                json!({
                    "query": { "any": [query] },
                    "uris": [SEARCH_URI_SCHEME],
                }),
            )
            .await?;

        // One SearchResult per backend; use the first that has tracks
        let tracks = results
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("tracks").and_then(Value::as_array))
            .find(|tracks| !tracks.is_empty())
            .cloned()
            .unwrap_or_default();

        Ok(tracks
            .into_iter()
            .filter_map(|t| serde_json::from_value::<MopidyTrack>(t).ok())
            .take(limit)
            .map(|t| TrackCandidate {
                id: t.uri.clone(),
                uri: t.uri,
                name: t.name,
                artists: t.artists.into_iter().map(|a| a.name).collect(),
                popularity: None,
            })
            .collect())
    }
}

#[async_trait]
impl TrackSearch for MopidyClient {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>> {
        self.search(query, limit)
            .await
            .map_err(|e| Error::ResolverUnavailable(e.to_string()))
    }
}

#[async_trait]
impl DownstreamQueue for MopidyClient {
    fn name(&self) -> &'static str {
        "mopidy"
    }

    async fn enqueue(&self, track: &ResolvedTrack) -> Result<()> {
        self.call("core.tracklist.add", json!({ "uris": [track.uri] }))
            .await
            .map(|_| ())
            .map_err(|e| Error::DownstreamUnavailable(e.to_string()))
    }

    async fn remove(&self, record: &QueueRecord) -> Result<()> {
        self.call(
            "core.tracklist.remove",
            json!({ "criteria": { "uri": [record.uri] } }),
        )
        .await
        .map(|_| ())
        .map_err(|e| Error::DownstreamUnavailable(e.to_string()))
    }

    async fn load(&self, uris: &[String]) -> Result<()> {
        // The synced tracks normally are in the tracklist already
        let length = self
            .tracklist_length()
            .await
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;
        if length == 0 && !uris.is_empty() {
            self.call("core.tracklist.add", json!({ "uris": uris }))
                .await
                .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let state = self
            .playback_state()
            .await
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;
        let method = match state.as_str() {
            "paused" => "core.playback.resume",
            "playing" => return Ok(()),
            _ => "core.playback.play",
        };
        self.call(method, json!({}))
            .await
            .map(|_| ())
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))
    }

    async fn pause(&self) -> Result<()> {
        self.call("core.playback.pause", json!({}))
            .await
            .map(|_| ())
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))
    }
}
