//! Upstream playlist sources

pub mod vrt;

use crate::error::Result;
use async_trait::async_trait;
use vjn_common::PlaylistEntry;

pub use vrt::VrtPlaylistSource;

/// Externally published track list
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Current playlist in play order (oldest first)
    ///
    /// An empty playlist is valid. Fails with
    /// [`crate::Error::SourceUnavailable`] on network or parse errors.
    async fn fetch(&self) -> Result<Vec<PlaylistEntry>>;
}
