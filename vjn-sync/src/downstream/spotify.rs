//! Spotify Web API client
//!
//! Serves both as the track search for the resolver and as the queue of a
//! Spotify Connect device.
//!
//! - Access tokens are minted from the configured refresh token and renewed
//!   60 s before they expire; a 401 forces one refresh and a single retry
//! - A 429 is retried once after `Retry-After`
//! - The device is looked up by name and cached until it disappears
//!
//! The Web API cannot queue onto an idle device and cannot remove queued
//! tracks. Tracks synced before playback starts therefore stay in the queue
//! state and reach the device through [`DownstreamQueue::load`]; removal only
//! drops the record.

use super::DownstreamQueue;
use crate::config::SpotifyConfig;
use crate::error::{Error, Result};
use crate::resolver::{TrackCandidate, TrackSearch};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vjn_common::{QueueRecord, ResolvedTrack};

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
const MAX_RETRY_AFTER_SECS: u64 = 60;
const REQUESTS_PER_SECOND: u32 = 5;
const MAX_SEARCH_LIMIT: usize = 50;

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Token refresh failed: {0}")]
    Auth(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Device '{0}' not available")]
    DeviceNotFound(String),
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Spotify Connect device
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    uri: String,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    popularity: Option<u32>,
}

pub struct SpotifyClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    device_name: String,
    device_attempts: u32,
    device_retry_delay: Duration,
    token: Mutex<Option<AccessToken>>,
    device_id: Mutex<Option<String>>,
    /// Set once the device has been handed the queue; later adds go to its queue
    loaded: AtomicBool,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        // Safe: constant is non-zero
        let quota = governor::Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).expect("requests per second is non-zero"),
        );

        Ok(Self {
            http,
            api_base: SPOTIFY_API_BASE.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            device_name: config.device_name.clone(),
            device_attempts: 3,
            device_retry_delay: Duration::from_secs(2),
            token: Mutex::new(None),
            device_id: Mutex::new(None),
            loaded: AtomicBool::new(false),
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Point the client at other API and token endpoints
    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.token_url = token_url.into();
        self
    }

    /// Device lookup retry policy for player calls
    pub fn with_device_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.device_attempts = attempts.max(1);
        self.device_retry_delay = delay;
        self
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    async fn refresh_access_token(&self) -> std::result::Result<AccessToken, SpotifyError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(e.to_string()))?;

        info!("Spotify access token refreshed");
        let lifetime = token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }

    async fn access_token(&self) -> std::result::Result<String, SpotifyError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }
        let fresh = self.refresh_access_token().await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Authorized API call; returns the JSON body when there is one
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<Option<Value>, SpotifyError> {
        let url = format!("{}{}", self.api_base, path);
        let mut refreshed = false;
        let mut throttled = false;

        loop {
            self.rate_limiter.until_ready().await;
            let token = self.access_token().await?;

            debug!(method = %method, path = %path, "Spotify API request");

            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SpotifyError::Network(e.to_string()))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!("Access token rejected, refreshing");
                refreshed = true;
                self.invalidate_token().await;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS && !throttled {
                throttled = true;
                let wait = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                    .min(MAX_RETRY_AFTER_SECS);
                warn!(wait_secs = wait, path = %path, "Spotify rate limit hit, backing off");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(SpotifyError::Api(status.as_u16(), text));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| SpotifyError::Network(e.to_string()))?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            // Player endpoints answer with plain text on some devices
            return Ok(serde_json::from_slice(&bytes).ok());
        }
    }

    /// Connect devices currently visible to the account
    pub async fn devices(&self) -> std::result::Result<Vec<Device>, SpotifyError> {
        let body = self.send(Method::GET, "/me/player/devices", &[], None).await?;
        match body {
            Some(value) => serde_json::from_value::<DevicesResponse>(value)
                .map(|r| r.devices)
                .map_err(|e| SpotifyError::Parse(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Find the configured device, retrying while it is not listed
    pub async fn find_device(
        &self,
        attempts: u32,
        delay: Duration,
    ) -> std::result::Result<String, SpotifyError> {
        for attempt in 1..=attempts.max(1) {
            let devices = self.devices().await?;
            let found = devices
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(&self.device_name))
                .and_then(|d| d.id.clone());

            if let Some(id) = found {
                info!(device = %self.device_name, "Spotify device found");
                *self.device_id.lock().await = Some(id.clone());
                return Ok(id);
            }

            let available: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
            warn!(
                device = %self.device_name,
                attempt,
                attempts,
                available = ?available,
                "Spotify device not listed"
            );
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(SpotifyError::DeviceNotFound(self.device_name.clone()))
    }

    async fn device_id(&self) -> std::result::Result<String, SpotifyError> {
        if let Some(id) = self.device_id.lock().await.clone() {
            return Ok(id);
        }
        self.find_device(self.device_attempts, self.device_retry_delay)
            .await
    }

    /// Player call targeted at the configured device
    async fn player_call(
        &self,
        method: Method,
        path: &str,
        extra_query: &[(&str, &str)],
        body: Value,
    ) -> std::result::Result<(), SpotifyError> {
        let device_id = self.device_id().await?;
        let mut query = extra_query.to_vec();
        query.push(("device_id", device_id.as_str()));

        match self.send(method, path, &query, Some(&body)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if matches!(e, SpotifyError::Api(404, _)) {
                    // Device went away; look it up again next time
                    *self.device_id.lock().await = None;
                }
                Err(e)
            }
        }
    }

    /// Move playback to the configured device
    pub async fn transfer(&self, play: bool) -> std::result::Result<(), SpotifyError> {
        let device_id = self.device_id().await?;
        let body = json!({ "device_ids": [device_id], "play": play });
        self.send(Method::PUT, "/me/player", &[], Some(&body))
            .await
            .map(|_| ())
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<TrackCandidate>, SpotifyError> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT).to_string();
        let body = self
            .send(
                Method::GET,
                "/search",
                &[("q", query), ("type", "track"), ("limit", limit.as_str())],
                None,
            )
            .await?;

        let items = body
            .as_ref()
            .and_then(|b| b.pointer("/tracks/items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<ApiTrack>(item).ok())
            .filter_map(|track| {
                Some(TrackCandidate {
                    id: track.id?,
                    uri: track.uri,
                    name: track.name,
                    artists: track.artists.into_iter().map(|a| a.name).collect(),
                    popularity: track.popularity,
                })
            })
            .collect())
    }
}

#[async_trait]
impl TrackSearch for SpotifyClient {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>> {
        self.search(query, limit)
            .await
            .map_err(|e| Error::ResolverUnavailable(e.to_string()))
    }
}

#[async_trait]
impl DownstreamQueue for SpotifyClient {
    fn name(&self) -> &'static str {
        "spotify"
    }

    async fn enqueue(&self, track: &ResolvedTrack) -> Result<()> {
        if !self.loaded.load(Ordering::SeqCst) {
            debug!(track_id = %track.track_id, "Playback not loaded, track handed over on play");
            return Ok(());
        }
        self.player_call(
            Method::POST,
            "/me/player/queue",
            &[("uri", track.uri.as_str())],
            json!({}),
        )
        .await
        .map_err(|e| Error::DownstreamUnavailable(e.to_string()))
    }

    async fn remove(&self, record: &QueueRecord) -> Result<()> {
        debug!(track_id = %record.track_id, "Spotify queue has no removal, dropping record only");
        Ok(())
    }

    async fn load(&self, uris: &[String]) -> Result<()> {
        let result = if uris.is_empty() {
            self.transfer(false).await
        } else {
            self.player_call(Method::PUT, "/me/player/play", &[], json!({ "uris": uris }))
                .await
        };
        result.map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.transfer(true)
            .await
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))
    }

    async fn pause(&self) -> Result<()> {
        match self
            .player_call(Method::PUT, "/me/player/pause", &[], json!({}))
            .await
        {
            Ok(()) => Ok(()),
            // Already paused
            Err(SpotifyError::Api(403, _)) => {
                debug!("Pause rejected, player already paused");
                Ok(())
            }
            Err(e) => Err(Error::PlaybackUnavailable(e.to_string())),
        }
    }
}
