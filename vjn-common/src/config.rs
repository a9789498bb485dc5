//! Configuration file loading
//!
//! Every value in the TOML file is optional. Callers layer it underneath
//! command-line arguments and environment variables, so the resolution order is:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and the
//! compiled defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Control API port
    pub control_port: Option<u16>,
    /// Downstream backend: "spotify" or "mopidy"
    pub backend: Option<String>,
    pub logging: LoggingConfig,
    pub spotify: SpotifySection,
    pub mopidy: MopidySection,
    pub audit: AuditSection,
    pub sync: SyncSection,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "vjn_sync=debug"
    pub level: Option<String>,
}

/// Spotify Web API credentials and target device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifySection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub device_name: Option<String>,
}

/// Mopidy JSON-RPC endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MopidySection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Optional spreadsheet audit log
///
/// Google access tokens expire after about an hour, so a fixed
/// `access_token` only suits short runs. For a long-running service point
/// `access_token_file` at a file that an external job keeps refreshed; it is
/// re-read whenever the Sheets API answers 401.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub spreadsheet_id: Option<String>,
    pub access_token: Option<String>,
    pub access_token_file: Option<PathBuf>,
}

/// Sync engine tunables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub poll_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub retention_hours: Option<u64>,
    pub not_found_ttl_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub seed_window: Option<usize>,
    pub poll_window: Option<usize>,
    pub match_threshold: Option<f64>,
}

/// Locate the config file for `module`
///
/// On Linux `~/.config/vjn/<module>.toml` is preferred over
/// `/etc/vjn/<module>.toml`; other platforms only use the user config dir.
pub fn config_file_path(module: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module);

    let user_config = dirs::config_dir().map(|d| d.join("vjn").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/vjn").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration with graceful degradation
///
/// - `explicit` path given: it must exist and parse
/// - otherwise the default locations are searched; absent or broken files
///   log a warning and fall back to defaults
pub fn load_toml_config(explicit: Option<&Path>, module: &str) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return read_toml_config(path);
    }

    match config_file_path(module) {
        Some(path) => match read_toml_config(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!(
                    "Ignoring unreadable config file {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Ok(TomlConfig::default())
            }
        },
        None => {
            warn!("No config file found for {}, using defaults", module);
            Ok(TomlConfig::default())
        }
    }
}

/// Write a config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
