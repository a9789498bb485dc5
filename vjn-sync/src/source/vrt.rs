//! VRT "De Jaren Nul" playlist over the public VRT GraphQL API
//!
//! The livestream page exposes its playlist as a paginated tile list of song
//! tiles, newest first. Tiles without both a title and an artist
//! (`description`) are skipped one by one; only an unusable document as a
//! whole is an error.

use super::PlaylistSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use vjn_common::PlaylistEntry;

pub const VRT_GRAPHQL_URL: &str = "https://www.vrt.be/vrtnu-api/graphql/public/v1";
const COMPONENT_ID: &str = "$byU4fHBsYXlsaXN0fHAlL2xpdmVzdHJlYW0vYXVkaW8vc3R1ZGlvLWJydXNzZWwtZGUtamFyZW4tbnVsLz90YWI9cGxheWxpc3Ql";
const CLIENT_NAME: &str = "WEB";
const CLIENT_VERSION: &str = "1.5.15";
const ITEM_COUNT: u32 = 30;

const PLAYLIST_QUERY: &str = r#"
query component($componentId: ID!, $lazyItemCount: Int = 100) {
  component(id: $componentId) {
    ... on ContainerNavigationItem {
      components {
        ... on PaginatedTileList {
          paginatedItems(first: $lazyItemCount) {
            edges {
              node {
                ... on SongTile {
                  title
                  description
                  startDate
                  active
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// Outcome of the last successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchDiagnostics {
    pub fetched_at: DateTime<Utc>,
    pub entries: usize,
    pub skipped: usize,
}

pub struct VrtPlaylistSource {
    client: reqwest::Client,
    url: String,
    last_fetch: Mutex<Option<FetchDiagnostics>>,
}

impl VrtPlaylistSource {
    /// Source against the public VRT endpoint
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_url(VRT_GRAPHQL_URL, timeout)
    }

    /// Source against an arbitrary GraphQL endpoint
    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            last_fetch: Mutex::new(None),
        })
    }

    /// Diagnostics of the last successful fetch, if any
    pub fn last_fetch(&self) -> Option<FetchDiagnostics> {
        self.last_fetch.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl PlaylistSource for VrtPlaylistSource {
    async fn fetch(&self) -> Result<Vec<PlaylistEntry>> {
        let payload = json!({
            "operationName": "component",
            "query": PLAYLIST_QUERY,
            "variables": {
                "componentId": COMPONENT_ID,
                "lazyItemCount": ITEM_COUNT,
            },
        });

        debug!(url = %self.url, "Fetching VRT playlist");

        let response = self
            .client
            .post(&self.url)
            .header("x-vrt-client-name", CLIENT_NAME)
            .header("x-vrt-client-version", CLIENT_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SourceUnavailable(format!(
                "VRT API returned {}: {}",
                status, body
            )));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("Invalid JSON: {}", e)))?;

        let parsed = parse_playlist(&document)?;
        if parsed.skipped > 0 {
            warn!(skipped = parsed.skipped, "Skipped malformed playlist entries");
        }
        debug!(entries = parsed.entries.len(), "Fetched VRT playlist");

        if let Ok(mut last) = self.last_fetch.lock() {
            *last = Some(FetchDiagnostics {
                fetched_at: vjn_common::time::now(),
                entries: parsed.entries.len(),
                skipped: parsed.skipped,
            });
        }

        Ok(parsed.entries)
    }
}

/// Entries extracted from a GraphQL document
#[derive(Debug, Default)]
pub(crate) struct ParsedPlaylist {
    /// Oldest first
    pub entries: Vec<PlaylistEntry>,
    pub skipped: usize,
}

/// Extract song tiles from the GraphQL response
///
/// The feed lists the most recent song first; the result is reversed into
/// play order.
pub(crate) fn parse_playlist(document: &Value) -> Result<ParsedPlaylist> {
    let component = document
        .get("data")
        .and_then(|d| d.get("component"))
        .filter(|c| !c.is_null())
        .ok_or_else(|| {
            let reason = document
                .get("errors")
                .map(|e| e.to_string())
                .unwrap_or_else(|| "missing data.component".to_string());
            Error::SourceUnavailable(format!("Unusable playlist document: {}", reason))
        })?;

    let components = component
        .get("components")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let Some(edges) = components
        .iter()
        .filter_map(|c| c.get("paginatedItems"))
        .find_map(|p| p.get("edges").and_then(Value::as_array))
    else {
        return Ok(ParsedPlaylist::default());
    };

    let mut parsed = ParsedPlaylist::default();
    for edge in edges {
        let node = edge.get("node");
        let field = |name: &str| {
            node.and_then(|n| n.get(name))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        match (field("description"), field("title")) {
            (Some(artist), Some(title)) => parsed.entries.push(PlaylistEntry::new(artist, title)),
            _ => parsed.skipped += 1,
        }
    }
    parsed.entries.reverse();
    Ok(parsed)
}
