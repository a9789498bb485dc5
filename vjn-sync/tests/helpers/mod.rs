//! Test doubles for the sync engine seams
//!
//! - [`FakeSource`]: settable playlist, can be switched to fail or hang
//! - [`FakeSearch`]: in-memory catalog searched by title containment
//! - [`FakeDownstream`]: records every call, with per-track and transport failures
//!   and per-track hangs

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vjn_common::{PlaylistEntry, QueueRecord, ResolvedTrack};
use vjn_sync::config::SyncConfig;
use vjn_sync::downstream::DownstreamQueue;
use vjn_sync::engine::SyncEngine;
use vjn_sync::resolver::{TrackCandidate, TrackResolver, TrackSearch};
use vjn_sync::source::PlaylistSource;
use vjn_sync::{Error, Result};

/// Far longer than any request timeout used in tests
pub const HANG: Duration = Duration::from_secs(3600);

pub fn entry(artist: &str, title: &str) -> PlaylistEntry {
    PlaylistEntry::new(artist, title)
}

pub fn candidate(id: &str, artist: &str, title: &str) -> TrackCandidate {
    TrackCandidate {
        id: id.to_string(),
        uri: format!("spotify:track:{}", id),
        name: title.to_string(),
        artists: vec![artist.to_string()],
        popularity: Some(50),
    }
}

// ========================================
// Playlist source
// ========================================

#[derive(Default)]
pub struct FakeSource {
    entries: Mutex<Vec<PlaylistEntry>>,
    failing: AtomicBool,
    hanging: AtomicBool,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(entries: Vec<PlaylistEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(entries),
            ..Default::default()
        })
    }

    pub fn set_entries(&self, entries: Vec<PlaylistEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `fetch` sleep for [`HANG`] before answering
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaylistSource for FakeSource {
    async fn fetch(&self) -> Result<Vec<PlaylistEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(HANG).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::SourceUnavailable("feed offline".to_string()));
        }
        Ok(self.entries.lock().unwrap().clone())
    }
}

// ========================================
// Track search
// ========================================

/// Returns every catalog track whose title occurs in the query
#[derive(Default)]
pub struct FakeSearch {
    catalog: Mutex<Vec<TrackCandidate>>,
    failing_titles: Mutex<HashSet<String>>,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn new(catalog: Vec<TrackCandidate>) -> Arc<Self> {
        Arc::new(Self {
            catalog: Mutex::new(catalog),
            ..Default::default()
        })
    }

    pub fn add(&self, track: TrackCandidate) {
        self.catalog.lock().unwrap().push(track);
    }

    /// Searches mentioning `title` fail with a provider error
    pub fn fail_title(&self, title: &str) {
        self.failing_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_titles.lock().unwrap().clear();
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl TrackSearch for FakeSearch {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>> {
        self.queries.lock().unwrap().push(query.to_string());

        if self
            .failing_titles
            .lock()
            .unwrap()
            .iter()
            .any(|title| query.contains(title.as_str()))
        {
            return Err(Error::ResolverUnavailable("search offline".to_string()));
        }

        Ok(self
            .catalog
            .lock()
            .unwrap()
            .iter()
            .filter(|c| query.contains(c.name.as_str()))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ========================================
// Downstream queue
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Enqueue(String),
    Remove(String),
    Load(Vec<String>),
    Resume,
    Pause,
}

#[derive(Default)]
pub struct FakeDownstream {
    calls: Mutex<Vec<Call>>,
    failing_enqueue: Mutex<HashSet<String>>,
    failing_remove: Mutex<HashSet<String>>,
    hanging_enqueue: Mutex<HashSet<String>>,
    transport_down: AtomicBool,
    resume_down: AtomicBool,
}

impl FakeDownstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Track ids passed to `enqueue`, in call order
    pub fn enqueued(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Enqueue(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remove(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn fail_enqueue(&self, track_id: &str) {
        self.failing_enqueue.lock().unwrap().insert(track_id.to_string());
    }

    pub fn fail_remove(&self, track_id: &str) {
        self.failing_remove.lock().unwrap().insert(track_id.to_string());
    }

    /// `enqueue` of `track_id` sleeps for [`HANG`] before answering
    pub fn hang_enqueue(&self, track_id: &str) {
        self.hanging_enqueue.lock().unwrap().insert(track_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_enqueue.lock().unwrap().clear();
        self.failing_remove.lock().unwrap().clear();
        self.hanging_enqueue.lock().unwrap().clear();
    }

    /// Make load/resume/pause fail
    pub fn set_transport_down(&self, down: bool) {
        self.transport_down.store(down, Ordering::SeqCst);
    }

    /// Make only resume fail, so a load can succeed on its own
    pub fn set_resume_down(&self, down: bool) {
        self.resume_down.store(down, Ordering::SeqCst);
    }

    fn transport(&self, call: Call) -> Result<()> {
        if self.transport_down.load(Ordering::SeqCst) {
            return Err(Error::PlaybackUnavailable("player offline".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl DownstreamQueue for FakeDownstream {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn enqueue(&self, track: &ResolvedTrack) -> Result<()> {
        let hangs = self.hanging_enqueue.lock().unwrap().contains(&track.track_id);
        if hangs {
            tokio::time::sleep(HANG).await;
        }
        if self.failing_enqueue.lock().unwrap().contains(&track.track_id) {
            return Err(Error::DownstreamUnavailable("queue rejected add".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Enqueue(track.track_id.clone()));
        Ok(())
    }

    async fn remove(&self, record: &QueueRecord) -> Result<()> {
        if self.failing_remove.lock().unwrap().contains(&record.track_id) {
            return Err(Error::DownstreamUnavailable("queue rejected removal".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Remove(record.track_id.clone()));
        Ok(())
    }

    async fn load(&self, uris: &[String]) -> Result<()> {
        self.transport(Call::Load(uris.to_vec()))
    }

    async fn resume(&self) -> Result<()> {
        if self.resume_down.load(Ordering::SeqCst) {
            return Err(Error::PlaybackUnavailable("player refused to start".to_string()));
        }
        self.transport(Call::Resume)
    }

    async fn pause(&self) -> Result<()> {
        self.transport(Call::Pause)
    }
}

// ========================================
// Wiring
// ========================================

pub fn test_config() -> SyncConfig {
    SyncConfig {
        request_timeout: Duration::from_secs(2),
        ..SyncConfig::default()
    }
}

pub fn build_engine(
    source: Arc<FakeSource>,
    search: Arc<FakeSearch>,
    downstream: Arc<FakeDownstream>,
    config: SyncConfig,
) -> SyncEngine {
    let resolver = TrackResolver::new(search, config.match_threshold, config.not_found_ttl);
    SyncEngine::new(source, resolver, downstream, config)
}
