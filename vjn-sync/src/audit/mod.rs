//! Audit log of added tracks
//!
//! One row per track; re-adding a track increments its counter. Writes are
//! best-effort: the engine spawns them and only logs failures.

pub mod sheets;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use vjn_common::{AuditRecord, ResolvedTrack};

pub use sheets::SheetsAuditSink;

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one add of `track`; returns the row after the update
    async fn log_add(&self, track: &ResolvedTrack) -> Result<AuditRecord>;
}

/// In-process audit log
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_add(&self, track: &ResolvedTrack) -> Result<AuditRecord> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Audit("audit log lock poisoned".to_string()))?;

        if let Some(existing) = records.iter_mut().find(|r| r.track_id == track.track_id) {
            existing.times_added += 1;
            return Ok(existing.clone());
        }

        let record = AuditRecord {
            track_id: track.track_id.clone(),
            artist: track.artist.clone(),
            title: track.title.clone(),
            times_added: 1,
        };
        records.push(record.clone());
        Ok(record)
    }
}
