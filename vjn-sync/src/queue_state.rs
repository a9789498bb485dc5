//! Authoritative record of tracks active in the downstream queue
//!
//! Owned by the sync engine behind a mutex; the control surface only ever
//! receives [`QueueState::snapshot`] copies. Records keep insertion order,
//! which is also the order the tracks were added downstream.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use vjn_common::{QueueRecord, ResolvedTrack};

#[derive(Debug, Default)]
pub struct QueueState {
    /// Insertion-ordered records
    records: Vec<QueueRecord>,
    /// track_id -> index into `records`
    index: HashMap<String, usize>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, track_id: &str) -> bool {
        self.index.contains_key(track_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a successfully added track
    ///
    /// Idempotent: recording a track that is already present only moves its
    /// `last_seen` forward. Returns true when a new record was created.
    pub fn record(&mut self, track: &ResolvedTrack, now: DateTime<Utc>) -> bool {
        if let Some(&i) = self.index.get(&track.track_id) {
            let record = &mut self.records[i];
            if now > record.last_seen {
                record.last_seen = now;
            }
            return false;
        }

        self.index
            .insert(track.track_id.clone(), self.records.len());
        self.records.push(QueueRecord::from_track(track, now));
        true
    }

    /// Mark a track as still present upstream
    ///
    /// Returns false when the track is not recorded.
    pub fn touch(&mut self, track_id: &str, now: DateTime<Utc>) -> bool {
        match self.index.get(track_id) {
            Some(&i) => {
                let record = &mut self.records[i];
                if now > record.last_seen {
                    record.last_seen = now;
                }
                true
            }
            None => false,
        }
    }

    /// Records whose `last_seen` is strictly before `older_than`
    pub fn stale(&self, older_than: DateTime<Utc>) -> Vec<QueueRecord> {
        self.records
            .iter()
            .filter(|r| r.last_seen < older_than)
            .cloned()
            .collect()
    }

    /// Drop records with `last_seen` strictly before `older_than`
    ///
    /// Returns the removed track ids in insertion order.
    pub fn expire(&mut self, older_than: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.last_seen < older_than)
            .map(|r| r.track_id.clone())
            .collect();
        self.remove_ids(&expired);
        expired
    }

    /// Drop the given records (unknown ids are ignored)
    ///
    /// Returns how many records were removed.
    pub fn remove_ids(&mut self, track_ids: &[String]) -> usize {
        if track_ids.is_empty() {
            return 0;
        }
        let before = self.records.len();
        self.records.retain(|r| !track_ids.contains(&r.track_id));
        self.reindex();
        before - self.records.len()
    }

    /// Copy of all records in insertion order
    pub fn snapshot(&self) -> Vec<QueueRecord> {
        self.records.clone()
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.track_id.clone(), i))
            .collect();
    }
}
