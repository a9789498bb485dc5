//! Data model shared by the sync service and its helpers
//!
//! - [`PlaylistEntry`]: one row of the externally published playlist
//! - [`ResolvedTrack`]: provider track an entry resolved to
//! - [`QueueRecord`]: a track the service considers active downstream
//! - [`PlaybackState`]: control surface state machine
//! - [`AuditRecord`]: row shape of the optional audit log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the upstream playlist
///
/// Entries are re-fetched on every poll and carry no identity beyond the
/// artist/title pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub artist: String,
    pub title: String,
}

impl PlaylistEntry {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for PlaylistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Provider track an entry resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    /// Opaque provider-assigned identifier (uniqueness key downstream)
    pub track_id: String,
    /// Artist credit as reported by the provider (comma separated)
    pub artist: String,
    /// Track title as reported by the provider
    pub title: String,
    /// URI handed to the downstream queue (e.g. `spotify:track:...`)
    pub uri: String,
}

/// Who created a queue record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Sync,
}

/// A track considered active in the downstream queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub track_id: String,
    pub uri: String,
    pub artist: String,
    pub title: String,
    /// When the downstream add succeeded
    pub added_at: DateTime<Utc>,
    /// Last poll that still saw this track upstream
    pub last_seen: DateTime<Utc>,
    pub source: RecordSource,
}

impl QueueRecord {
    pub fn from_track(track: &ResolvedTrack, at: DateTime<Utc>) -> Self {
        Self {
            track_id: track.track_id.clone(),
            uri: track.uri.clone(),
            artist: track.artist.clone(),
            title: track.title.clone(),
            added_at: at,
            last_seen: at,
            source: RecordSource::Sync,
        }
    }
}

/// Playback state exposed by the control API
///
/// Only explicit control calls change it; queue mutation never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loaded,
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Loaded => write!(f, "loaded"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

/// One row of the audit log, keyed by track id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub times_added: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_playback_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlaybackState::Stopped).unwrap(),
            "\"stopped\""
        );
        assert_eq!(
            serde_json::to_string(&PlaybackState::Playing).unwrap(),
            "\"playing\""
        );
        assert_eq!(PlaybackState::Loaded.to_string(), "loaded");
        assert_eq!(PlaybackState::default(), PlaybackState::Stopped);
    }

    #[test]
    fn test_queue_record_from_track() {
        let track = ResolvedTrack {
            track_id: "t1".into(),
            artist: "Artist A".into(),
            title: "Song X".into(),
            uri: "spotify:track:t1".into(),
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let record = QueueRecord::from_track(&track, at);

        assert_eq!(record.track_id, "t1");
        assert_eq!(record.uri, "spotify:track:t1");
        assert_eq!(record.added_at, at);
        assert_eq!(record.last_seen, at);
        assert_eq!(serde_json::to_value(record.source).unwrap(), "sync");
    }

    #[test]
    fn test_playlist_entry_display() {
        let entry = PlaylistEntry::new("Outkast", "Hey Ya!");
        assert_eq!(entry.to_string(), "Outkast - Hey Ya!");
    }
}
