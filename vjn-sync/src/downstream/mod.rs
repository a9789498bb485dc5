//! Downstream players
//!
//! Both backends also provide the track search the resolver runs against, so
//! resolved URIs are always playable on the backend they are queued to.

pub mod mopidy;
pub mod spotify;

use crate::error::Result;
use async_trait::async_trait;
use vjn_common::{QueueRecord, ResolvedTrack};

pub use mopidy::MopidyClient;
pub use spotify::SpotifyClient;

/// Queue and transport control of the target player
///
/// Queue calls fail with [`crate::Error::DownstreamUnavailable`], transport
/// calls with [`crate::Error::PlaybackUnavailable`].
#[async_trait]
pub trait DownstreamQueue: Send + Sync {
    /// Short backend name for logs and `/health`
    fn name(&self) -> &'static str;

    /// Append a track to the player queue
    async fn enqueue(&self, track: &ResolvedTrack) -> Result<()>;

    /// Take a track out of the player queue
    async fn remove(&self, record: &QueueRecord) -> Result<()>;

    /// Hand the given URIs (play order) to the player
    async fn load(&self, uris: &[String]) -> Result<()>;

    /// Start or continue playback of what is loaded
    async fn resume(&self) -> Result<()>;

    /// Pause playback
    async fn pause(&self) -> Result<()>;
}
