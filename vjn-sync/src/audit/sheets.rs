//! Google Sheets audit log
//!
//! Rows live on the first sheet as `Spotify Artist | Spotify Title |
//! Times Added | URI`. A row is found by its URI (column D); a hit bumps
//! column C, a miss appends a new row. An empty sheet gets the header row
//! first.
//!
//! A static bearer token stops working once Google expires it (about an
//! hour). A sink built from a token file re-reads the file on 401 and
//! retries the request once.

use super::AuditSink;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use vjn_common::{AuditRecord, ResolvedTrack};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const HEADERS: [&str; 4] = ["Spotify Artist", "Spotify Title", "Times Added", "URI"];
const SHEET_RANGE: &str = "A:D";

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsAuditSink {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    access_token: RwLock<String>,
    token_file: Option<PathBuf>,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

fn cell_string(cell: Option<&Value>) -> String {
    match cell {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn is_header(row: &[Value]) -> bool {
    row.len() >= HEADERS.len()
        && row
            .iter()
            .zip(HEADERS.iter())
            .all(|(cell, header)| cell_string(Some(cell)) == *header)
}

impl SheetsAuditSink {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            access_token: RwLock::new(access_token.into()),
            token_file: None,
            write_lock: Mutex::new(()),
        })
    }

    /// Sink whose token is read from `path`, now and after every 401
    pub async fn from_token_file(
        spreadsheet_id: impl Into<String>,
        path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let path = path.into();
        let token = read_token(&path).await?;
        let mut sink = Self::new(spreadsheet_id, token, timeout)?;
        sink.token_file = Some(path);
        Ok(sink)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{}", self.api_base, self.spreadsheet_id, range)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Audit(format!("Sheets API returned {}: {}", status, body)))
    }

    /// Send with the current token; on 401 reload the token file and retry once
    async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.access_token.read().await.clone();
        let response = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::Audit(e.to_string()))?;

        let path = match &self.token_file {
            Some(path) if response.status() == reqwest::StatusCode::UNAUTHORIZED => path,
            _ => return Self::check(response).await,
        };

        let fresh = read_token(path).await?;
        if fresh == token {
            warn!(path = %path.display(), "Sheets token rejected and token file unchanged");
            return Self::check(response).await;
        }
        debug!(path = %path.display(), "Sheets token reloaded");
        *self.access_token.write().await = fresh.clone();

        let response = build(&self.http)
            .bearer_auth(&fresh)
            .send()
            .await
            .map_err(|e| Error::Audit(e.to_string()))?;
        Self::check(response).await
    }

    async fn read_rows(&self) -> Result<Vec<Vec<Value>>> {
        let url = self.values_url(SHEET_RANGE);
        let range: ValueRange = self
            .send(|http| http.get(&url))
            .await?
            .json()
            .await
            .map_err(|e| Error::Audit(format!("Invalid values response: {}", e)))?;
        Ok(range.values)
    }

    async fn update(&self, range: &str, values: Value) -> Result<()> {
        let url = self.values_url(range);
        let body = json!({ "values": values });
        self.send(|http| {
            http.put(&url)
                .query(&[("valueInputOption", "RAW")])
                .json(&body)
        })
        .await
        .map(|_| ())
    }

    async fn append(&self, row: Value) -> Result<()> {
        let url = format!("{}:append", self.values_url(SHEET_RANGE));
        let body = json!({ "values": [row] });
        self.send(|http| {
            http.post(&url)
                .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                .json(&body)
        })
        .await
        .map(|_| ())
    }
}

async fn read_token(path: &Path) -> Result<String> {
    let token = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Audit(format!("Cannot read token file {}: {}", path.display(), e)))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::Audit(format!("Token file {} is empty", path.display())));
    }
    Ok(token.to_string())
}

#[async_trait]
impl AuditSink for SheetsAuditSink {
    async fn log_add(&self, track: &ResolvedTrack) -> Result<AuditRecord> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_rows().await?;

        if rows.is_empty() {
            info!("Writing audit sheet header row");
            self.update("A1:D1", json!([HEADERS])).await?;
            rows.push(HEADERS.iter().map(|h| json!(h)).collect());
        }

        let has_header = rows.first().map(|row| is_header(row)).unwrap_or(false);
        let existing = rows
            .iter()
            .enumerate()
            .skip(usize::from(has_header))
            .find(|(_, row)| cell_string(row.get(3)) == track.uri);

        let record = match existing {
            Some((index, row)) => {
                let times_added = cell_string(row.get(2)).trim().parse::<u32>().unwrap_or(0) + 1;
                let sheet_row = index + 1;
                self.update(&format!("C{}", sheet_row), json!([[times_added]]))
                    .await?;
                AuditRecord {
                    track_id: track.track_id.clone(),
                    artist: cell_string(row.first()),
                    title: cell_string(row.get(1)),
                    times_added,
                }
            }
            None => {
                self.append(json!([track.artist, track.title, 1, track.uri]))
                    .await?;
                AuditRecord {
                    track_id: track.track_id.clone(),
                    artist: track.artist.clone(),
                    title: track.title.clone(),
                    times_added: 1,
                }
            }
        };

        debug!(
            track_id = %record.track_id,
            times_added = record.times_added,
            "Audit row written"
        );
        Ok(record)
    }
}
