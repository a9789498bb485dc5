//! # VJN Common Library
//!
//! Shared code for the VRT "De Jaren Nul" sync workspace:
//! - Data model (playlist entries, resolved tracks, queue records, playback state)
//! - Configuration file loading
//! - Error types
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    AuditRecord, PlaybackState, PlaylistEntry, QueueRecord, RecordSource, ResolvedTrack,
};
