//! get-token - one-time Spotify authorization helper
//!
//! Runs the authorization-code flow against a local callback and prints the
//! refresh token vjn-sync needs. Register
//! `http://127.0.0.1:<port>/callback` as a redirect URI of the Spotify app
//! first.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vjn_common::config::{read_toml_config, write_toml_config, TomlConfig};
use vjn_sync::downstream::spotify::SPOTIFY_TOKEN_URL;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const SCOPES: &str = "user-modify-playback-state user-read-playback-state user-read-currently-playing";

#[derive(Parser, Debug)]
#[command(name = "get-token")]
#[command(about = "Obtain a Spotify refresh token for vjn-sync")]
struct Args {
    /// Spotify app client ID
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    client_id: String,

    /// Spotify app client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Local callback port
    #[arg(long, default_value_t = 8888)]
    port: u16,

    /// Store the credentials in this vjn-sync config file
    #[arg(long)]
    write_config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    refresh_token: Option<String>,
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<Result<String, String>>>>>;

async fn callback(
    State(sender): State<CodeSender>,
    Query(params): Query<CallbackParams>,
) -> &'static str {
    let outcome = match (params.code, params.error) {
        (Some(code), _) => Ok(code),
        (None, Some(error)) => Err(error),
        (None, None) => Err("callback without code".to_string()),
    };
    let succeeded = outcome.is_ok();

    if let Some(tx) = sender.lock().unwrap_or_else(PoisonError::into_inner).take() {
        let _ = tx.send(outcome);
    }

    if succeeded {
        "Authorization received, you can close this window."
    } else {
        "Authorization failed, see the terminal."
    }
}

async fn wait_for_code(port: u16) -> Result<String> {
    let (tx, rx) = oneshot::channel();
    let sender: CodeSender = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new()
        .route("/callback", get(callback))
        .with_state(sender);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind callback listener on {}", addr))?;

    let (done_tx, done_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = done_rx.await;
            })
            .await
    });

    let outcome = rx.await.context("Callback server stopped early")?;
    let _ = done_tx.send(());
    server.await.context("Callback server task failed")??;

    outcome.map_err(|e| anyhow!("Spotify denied authorization: {}", e))
}

async fn exchange_code(args: &Args, code: &str, redirect_uri: &str) -> Result<String> {
    let response = reqwest::Client::new()
        .post(SPOTIFY_TOKEN_URL)
        .basic_auth(&args.client_id, Some(&args.client_secret))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .context("Token request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Token exchange rejected ({}): {}", status, body);
    }

    let token: TokenResponse = response.json().await.context("Invalid token response")?;
    token
        .refresh_token
        .ok_or_else(|| anyhow!("Token response carried no refresh token"))
}

fn store_credentials(path: &Path, args: &Args, refresh_token: &str) -> Result<()> {
    let mut config = if path.exists() {
        read_toml_config(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        TomlConfig::default()
    };

    config.spotify.client_id = Some(args.client_id.clone());
    config.spotify.client_secret = Some(args.client_secret.clone());
    config.spotify.refresh_token = Some(refresh_token.to_string());

    write_toml_config(&config, path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let redirect_uri = format!("http://127.0.0.1:{}/callback", args.port);

    let authorize = reqwest::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", args.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", SCOPES),
        ],
    )
    .context("Failed to build authorize URL")?;

    println!("Open this URL in a browser and approve access:\n\n{}\n", authorize);
    info!("Waiting for callback on {}", redirect_uri);

    let code = wait_for_code(args.port).await?;
    let refresh_token = exchange_code(&args, &code, &redirect_uri).await?;

    println!("SPOTIFY_REFRESH_TOKEN={}", refresh_token);

    if let Some(path) = &args.write_config {
        store_credentials(path, &args, &refresh_token)?;
        info!("Credentials written to {}", path.display());
    }

    Ok(())
}
