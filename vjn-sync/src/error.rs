//! Error types for vjn-sync
//!
//! One variant per failure domain of the sync path. None of them is fatal to
//! the process: the engine logs and retries on the next timer tick. A search
//! that legitimately finds nothing is not an error at all, see
//! [`crate::resolver::Resolution::NotFound`].

use thiserror::Error;

/// Main error type for vjn-sync
#[derive(Error, Debug)]
pub enum Error {
    /// Playlist fetch failed (network or unparseable document); skip this poll
    #[error("Playlist source unavailable: {0}")]
    SourceUnavailable(String),

    /// Search API unreachable or rejected our credentials; retry entry next poll
    #[error("Track resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// Downstream add/remove call failed; queue state left untouched
    #[error("Downstream queue unavailable: {0}")]
    DownstreamUnavailable(String),

    /// Control call could not reach the player; playback state unchanged
    #[error("Playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Audit sink write failed (logged and swallowed by callers)
    #[error("Audit sink error: {0}")]
    Audit(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Errors bubbled up from vjn-common
    #[error(transparent)]
    Common(#[from] vjn_common::Error),
}

/// Convenience Result type using vjn-sync Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure is worth retrying on the next tick
    ///
    /// Configuration and server errors are not; everything on the network
    /// path is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable(_)
                | Error::ResolverUnavailable(_)
                | Error::DownstreamUnavailable(_)
                | Error::PlaybackUnavailable(_)
                | Error::Audit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_domain() {
        let err = Error::ResolverUnavailable("token expired".into());
        assert_eq!(err.to_string(), "Track resolver unavailable: token expired");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::SourceUnavailable("x".into()).is_transient());
        assert!(Error::DownstreamUnavailable("x".into()).is_transient());
        assert!(!Error::Config("x".into()).is_transient());
        assert!(!Error::Http("x".into()).is_transient());
    }
}
