//! vjn-sync configuration
//!
//! Command-line arguments (with environment fallbacks) are layered over the
//! optional TOML file from [`vjn_common::config`], then over compiled defaults.
//! The environment variable names match the ones the service has always used
//! (`SPOTIFY_CLIENT_ID`, `CONTROL_PORT`, `MOPIDY_HOST`, ...).

use crate::error::{Error, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use vjn_common::config::TomlConfig;

pub const DEFAULT_CONTROL_PORT: u16 = 8877;
pub const DEFAULT_DEVICE_NAME: &str = "Keuken";
pub const DEFAULT_MOPIDY_HOST: &str = "localhost";
pub const DEFAULT_MOPIDY_PORT: u16 = 6680;
pub const STREAM_NAME: &str = "De Jaren Nul - 109";

/// Downstream player the queue is synchronized to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Spotify Connect device driven through the Spotify Web API
    Spotify,
    /// Mopidy server (typically feeding an Icecast stream)
    Mopidy,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(Backend::Spotify),
            "mopidy" => Ok(Backend::Mopidy),
            other => Err(Error::Config(format!(
                "Unknown backend '{}', expected 'spotify' or 'mopidy'",
                other
            ))),
        }
    }
}

/// Command-line arguments for vjn-sync
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "vjn-sync")]
#[command(about = "Keeps a Spotify or Mopidy queue in sync with the VRT De Jaren Nul playlist")]
#[command(version)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "VJN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Control API port
    #[arg(short, long, env = "CONTROL_PORT")]
    pub port: Option<u16>,

    /// Downstream backend
    #[arg(long, value_enum, env = "SYNC_BACKEND")]
    pub backend: Option<Backend>,

    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,

    #[arg(long, env = "SPOTIFY_REFRESH_TOKEN", hide_env_values = true)]
    pub spotify_refresh_token: Option<String>,

    /// Spotify Connect device to drive
    #[arg(long, env = "SPOTIFY_DEVICE_NAME")]
    pub device_name: Option<String>,

    #[arg(long, env = "MOPIDY_HOST")]
    pub mopidy_host: Option<String>,

    #[arg(long, env = "MOPIDY_PORT")]
    pub mopidy_port: Option<u16>,

    /// Spreadsheet receiving the audit log (disabled when unset)
    #[arg(long, env = "GOOGLE_SHEETS_ID")]
    pub sheets_id: Option<String>,

    /// Bearer token for the Sheets API (expires after about an hour)
    #[arg(long, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
    pub sheets_token: Option<String>,

    /// File holding a Sheets bearer token kept fresh by an external job;
    /// re-read on 401 and preferred over GOOGLE_SHEETS_TOKEN
    #[arg(long, env = "GOOGLE_SHEETS_TOKEN_FILE")]
    pub sheets_token_file: Option<PathBuf>,
}

/// Spotify credentials and device
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub device_name: String,
}

/// Mopidy JSON-RPC endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct MopidyConfig {
    pub host: String,
    pub port: u16,
}

impl MopidyConfig {
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}/mopidy/rpc", self.host, self.port)
    }
}

/// Where the Sheets bearer token comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SheetsToken {
    Static(String),
    /// Re-read whenever the API rejects the current token
    File(PathBuf),
}

/// Audit sink target
#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    pub spreadsheet_id: String,
    pub token: SheetsToken,
}

/// Sync engine tunables
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Add-sync timer period
    pub poll_interval: Duration,
    /// Cleanup timer period
    pub cleanup_interval: Duration,
    /// How long a record may go unseen upstream before cleanup removes it
    pub retention: Duration,
    /// How long a "not found" resolution is trusted
    pub not_found_ttl: Duration,
    /// Bound applied to every network call
    pub request_timeout: Duration,
    /// Newest entries considered on the first successful add-sync
    pub seed_window: usize,
    /// Newest entries considered on later add-syncs
    pub poll_window: usize,
    /// Minimum weighted score for a search candidate to count as a match
    pub match_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(120),
            cleanup_interval: Duration::from_secs(24 * 3600),
            retention: Duration::from_secs(24 * 3600),
            not_found_ttl: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(10),
            seed_window: 20,
            poll_window: 5,
            match_threshold: 0.7,
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub control_port: u16,
    pub backend: Backend,
    /// Present whenever the Spotify backend is selected
    pub spotify: Option<SpotifyConfig>,
    pub mopidy: MopidyConfig,
    pub audit: Option<AuditConfig>,
    pub sync: SyncConfig,
}

impl Config {
    /// Layer arguments over the TOML file over defaults
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self> {
        let backend = match (args.backend, toml.backend.as_deref()) {
            (Some(backend), _) => backend,
            (None, Some(name)) => name.parse()?,
            (None, None) => Backend::Spotify,
        };

        let spotify = if backend == Backend::Spotify {
            Some(resolve_spotify(args, toml)?)
        } else {
            None
        };

        let mopidy = MopidyConfig {
            host: args
                .mopidy_host
                .clone()
                .or_else(|| toml.mopidy.host.clone())
                .unwrap_or_else(|| DEFAULT_MOPIDY_HOST.to_string()),
            port: args
                .mopidy_port
                .or(toml.mopidy.port)
                .unwrap_or(DEFAULT_MOPIDY_PORT),
        };

        let audit = resolve_audit(args, toml);

        let defaults = SyncConfig::default();
        let s = &toml.sync;
        let sync = SyncConfig {
            poll_interval: s
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            cleanup_interval: s
                .cleanup_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            retention: s
                .retention_hours
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.retention),
            not_found_ttl: s
                .not_found_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.not_found_ttl),
            request_timeout: s
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            seed_window: s.seed_window.unwrap_or(defaults.seed_window),
            poll_window: s.poll_window.unwrap_or(defaults.poll_window),
            match_threshold: s.match_threshold.unwrap_or(defaults.match_threshold),
        };

        let config = Self {
            control_port: args
                .port
                .or(toml.control_port)
                .unwrap_or(DEFAULT_CONTROL_PORT),
            backend,
            spotify,
            mopidy,
            audit,
            sync,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sync.poll_interval.is_zero() || self.sync.cleanup_interval.is_zero() {
            return Err(Error::Config("Timer intervals must be non-zero".to_string()));
        }
        if self.sync.request_timeout.is_zero() {
            return Err(Error::Config("Request timeout must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.sync.match_threshold) {
            return Err(Error::Config(format!(
                "match_threshold must be within 0.0..=1.0, got {}",
                self.sync.match_threshold
            )));
        }
        if self.sync.seed_window == 0 || self.sync.poll_window == 0 {
            return Err(Error::Config("Sync windows must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_spotify(args: &Args, toml: &TomlConfig) -> Result<SpotifyConfig> {
    let client_id = non_empty(
        args.spotify_client_id
            .clone()
            .or_else(|| toml.spotify.client_id.clone()),
    );
    let client_secret = non_empty(
        args.spotify_client_secret
            .clone()
            .or_else(|| toml.spotify.client_secret.clone()),
    );
    let refresh_token = non_empty(
        args.spotify_refresh_token
            .clone()
            .or_else(|| toml.spotify.refresh_token.clone()),
    );

    match (client_id, client_secret, refresh_token) {
        (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(SpotifyConfig {
            client_id,
            client_secret,
            refresh_token,
            device_name: non_empty(
                args.device_name
                    .clone()
                    .or_else(|| toml.spotify.device_name.clone()),
            )
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
        }),
        _ => Err(Error::Config(
            "SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REFRESH_TOKEN must all be set \
             (run get-token once to obtain a refresh token)"
                .to_string(),
        )),
    }
}

fn resolve_audit(args: &Args, toml: &TomlConfig) -> Option<AuditConfig> {
    let spreadsheet_id = non_empty(
        args.sheets_id
            .clone()
            .or_else(|| toml.audit.spreadsheet_id.clone()),
    )?;
    let token_file = args
        .sheets_token_file
        .clone()
        .or_else(|| toml.audit.access_token_file.clone());
    let access_token = non_empty(
        args.sheets_token
            .clone()
            .or_else(|| toml.audit.access_token.clone()),
    );

    let token = match (token_file, access_token) {
        (Some(path), _) => SheetsToken::File(path),
        (None, Some(access_token)) => SheetsToken::Static(access_token),
        (None, None) => {
            tracing::warn!(
                "GOOGLE_SHEETS_ID set without GOOGLE_SHEETS_TOKEN or GOOGLE_SHEETS_TOKEN_FILE, \
                 audit log disabled"
            );
            return None;
        }
    };

    Some(AuditConfig {
        spreadsheet_id,
        token,
    })
}
