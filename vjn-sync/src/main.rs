//! vjn-sync - main entry point
//!
//! Keeps the downstream queue in sync with the VRT "De Jaren Nul" playlist
//! and serves the playback control API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vjn_common::config::{config_file_path, load_toml_config};
use vjn_sync::api::{self, AppState};
use vjn_sync::audit::{AuditSink, SheetsAuditSink};
use vjn_sync::config::{Args, Backend, Config, SheetsToken, STREAM_NAME};
use vjn_sync::downstream::{DownstreamQueue, MopidyClient, SpotifyClient};
use vjn_sync::engine::SyncEngine;
use vjn_sync::playback::PlaybackController;
use vjn_sync::resolver::{TrackResolver, TrackSearch};
use vjn_sync::source::VrtPlaylistSource;

const MODULE_NAME: &str = "vjn-sync";
const DEFAULT_LOG_FILTER: &str = "vjn_sync=info,vjn_common=info,tower_http=info";

const DEVICE_STARTUP_ATTEMPTS: u32 = 10;
const DEVICE_STARTUP_DELAY: Duration = Duration::from_secs(5);
const MOPIDY_STARTUP_ATTEMPTS: u32 = 30;
const MOPIDY_STARTUP_DELAY: Duration = Duration::from_secs(2);
const AUDIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The config file may carry the log filter, so read it before tracing starts
    let toml_config = load_toml_config(args.config.as_deref(), MODULE_NAME)
        .context("Failed to load config file")?;

    let configured_filter = toml_config.logging.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::resolve(&args, &toml_config).context("Invalid configuration")?;

    info!("Starting vjn-sync for {}", STREAM_NAME);
    match args.config.clone().or_else(|| config_file_path(MODULE_NAME)) {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using arguments, environment and defaults"),
    }
    info!(
        backend = ?config.backend,
        poll_secs = config.sync.poll_interval.as_secs(),
        cleanup_secs = config.sync.cleanup_interval.as_secs(),
        "Sync configuration"
    );

    let timeout = config.sync.request_timeout;

    let (search, downstream): (Arc<dyn TrackSearch>, Arc<dyn DownstreamQueue>) =
        match config.backend {
            Backend::Spotify => {
                let spotify = config
                    .spotify
                    .as_ref()
                    .context("Spotify backend selected without credentials")?;
                info!(device = %spotify.device_name, "Using Spotify Connect backend");

                let client = Arc::new(SpotifyClient::new(spotify, timeout)?);
                if let Err(e) = client
                    .find_device(DEVICE_STARTUP_ATTEMPTS, DEVICE_STARTUP_DELAY)
                    .await
                {
                    warn!(error = %e, "Spotify device not found yet, retrying on first player call");
                }

                let search: Arc<dyn TrackSearch> = client.clone();
                let downstream: Arc<dyn DownstreamQueue> = client;
                (search, downstream)
            }
            Backend::Mopidy => {
                let url = config.mopidy.rpc_url();
                info!(url = %url, "Using Mopidy backend");

                let client = Arc::new(MopidyClient::new(url, timeout)?);
                if !client
                    .wait_until_ready(MOPIDY_STARTUP_ATTEMPTS, MOPIDY_STARTUP_DELAY)
                    .await
                {
                    warn!("Mopidy not reachable yet, sync passes will keep retrying");
                }

                let search: Arc<dyn TrackSearch> = client.clone();
                let downstream: Arc<dyn DownstreamQueue> = client;
                (search, downstream)
            }
        };

    let source = Arc::new(VrtPlaylistSource::new(timeout)?);
    let resolver = TrackResolver::new(
        search,
        config.sync.match_threshold,
        config.sync.not_found_ttl,
    );

    let mut engine = SyncEngine::new(source, resolver, downstream.clone(), config.sync.clone());
    match &config.audit {
        Some(audit) => {
            info!("Audit log enabled (spreadsheet {})", audit.spreadsheet_id);
            let sink = match &audit.token {
                SheetsToken::Static(token) => {
                    SheetsAuditSink::new(&audit.spreadsheet_id, token, timeout)?
                }
                SheetsToken::File(path) => {
                    SheetsAuditSink::from_token_file(&audit.spreadsheet_id, path, timeout).await?
                }
            };
            let sink: Arc<dyn AuditSink> = Arc::new(sink);
            engine = engine.with_audit(sink);
        }
        None => info!("Audit log disabled"),
    }
    let engine = Arc::new(engine);
    let timers = engine.spawn_timers();

    let playback = Arc::new(PlaybackController::new(
        engine.queue_state(),
        downstream,
        timeout,
    ));

    let state = AppState {
        playback,
        engine: engine.clone(),
        stream_name: STREAM_NAME,
    };
    api::serve(state, config.control_port, shutdown_signal())
        .await
        .context("Control API failed")?;

    for timer in timers {
        timer.abort();
    }
    if tokio::time::timeout(AUDIT_FLUSH_TIMEOUT, engine.flush_audit())
        .await
        .is_err()
    {
        warn!("Pending audit writes abandoned");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
