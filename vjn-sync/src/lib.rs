//! # vjn-sync
//!
//! Keeps a downstream playback queue (Spotify Connect device or Mopidy server)
//! in sync with the VRT "De Jaren Nul" playlist, and exposes a small control
//! API to start and stop playback of what has been queued.
//!
//! The sync path never starts playback on its own.

pub mod api;
pub mod audit;
pub mod config;
pub mod downstream;
pub mod engine;
pub mod error;
pub mod playback;
pub mod queue_state;
pub mod resolver;
pub mod source;

pub use error::{Error, Result};
