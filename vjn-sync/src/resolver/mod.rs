//! Playlist entry to provider track resolution
//!
//! [`TrackResolver`] runs the search fallbacks from [`matcher::search_queries`]
//! against a [`TrackSearch`] provider and keeps two caches keyed by the
//! normalized (artist, title) pair:
//! - hits, kept for the process lifetime
//! - misses, kept for a short TTL so a track that appears on the provider
//!   later still gets picked up
//!
//! Provider failures are never cached.

pub mod matcher;

use crate::error::{Error, Result};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vjn_common::{PlaylistEntry, ResolvedTrack};

const FOUND_CACHE_CAPACITY: u64 = 10_000;
const NOT_FOUND_CACHE_CAPACITY: u64 = 2_000;

/// One search result from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    /// Provider popularity (0-100) when reported
    pub popularity: Option<u32>,
}

impl TrackCandidate {
    pub fn to_resolved(&self) -> ResolvedTrack {
        ResolvedTrack {
            track_id: self.id.clone(),
            artist: self.artists.join(", "),
            title: self.name.clone(),
            uri: self.uri.clone(),
        }
    }
}

/// Music provider search API
#[async_trait]
pub trait TrackSearch: Send + Sync {
    /// Search tracks; an empty result is not an error
    ///
    /// Fails with [`Error::ResolverUnavailable`] on auth or network errors.
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>>;
}

/// Outcome of resolving one entry
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(ResolvedTrack),
    NotFound,
}

type CacheKey = (String, String);

fn cache_key(entry: &PlaylistEntry) -> CacheKey {
    (
        matcher::normalize(&entry.artist),
        matcher::normalize(&entry.title),
    )
}

pub struct TrackResolver {
    search: Arc<dyn TrackSearch>,
    threshold: f64,
    found: Cache<CacheKey, ResolvedTrack>,
    not_found: Cache<CacheKey, ()>,
}

impl TrackResolver {
    pub fn new(search: Arc<dyn TrackSearch>, threshold: f64, not_found_ttl: Duration) -> Self {
        Self {
            search,
            threshold,
            found: Cache::builder().max_capacity(FOUND_CACHE_CAPACITY).build(),
            not_found: Cache::builder()
                .max_capacity(NOT_FOUND_CACHE_CAPACITY)
                .time_to_live(not_found_ttl)
                .build(),
        }
    }

    /// Previously resolved track for an entry, without searching
    pub async fn cached(&self, entry: &PlaylistEntry) -> Option<ResolvedTrack> {
        self.found.get(&cache_key(entry)).await
    }

    /// Resolve an entry to a provider track
    pub async fn resolve(&self, entry: &PlaylistEntry) -> Result<Resolution> {
        let key = cache_key(entry);

        if let Some(track) = self.found.get(&key).await {
            return Ok(Resolution::Found(track));
        }
        if self.not_found.contains_key(&key) {
            debug!(entry = %entry, "Skipping entry, recently not found");
            return Ok(Resolution::NotFound);
        }

        for query in matcher::search_queries(entry) {
            let candidates = self
                .search
                .search_tracks(&query, matcher::MAX_CANDIDATES)
                .await
                .map_err(|e| match e {
                    Error::ResolverUnavailable(_) => e,
                    other => Error::ResolverUnavailable(other.to_string()),
                })?;

            if let Some(best) = matcher::best_match(entry, &candidates, self.threshold) {
                let track = best.candidate.to_resolved();
                info!(
                    entry = %entry,
                    track_id = %track.track_id,
                    matched = %format!("{} - {}", track.artist, track.title),
                    score = best.score,
                    "Resolved"
                );
                self.found.insert(key, track.clone()).await;
                return Ok(Resolution::Found(track));
            }
            debug!(entry = %entry, query = %query, "No acceptable match for query");
        }

        info!(entry = %entry, "Not found");
        self.not_found.insert(key, ()).await;
        Ok(Resolution::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Search fake returning a fixed candidate list and counting calls
    struct FakeSearch {
        results: Mutex<Vec<TrackCandidate>>,
        fail: Mutex<bool>,
        calls: AtomicUsize,
        queries: Mutex<Vec<String>>,
    }

    impl FakeSearch {
        fn new(results: Vec<TrackCandidate>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                fail: Mutex::new(false),
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TrackSearch for FakeSearch {
        async fn search_tracks(&self, query: &str, _limit: usize) -> Result<Vec<TrackCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            if *self.fail.lock().unwrap() {
                return Err(Error::Http("connection refused".into()));
            }
            Ok(self.results.lock().unwrap().clone())
        }
    }

    fn hey_ya() -> TrackCandidate {
        TrackCandidate {
            id: "t1".into(),
            uri: "spotify:track:t1".into(),
            name: "Hey Ya!".into(),
            artists: vec!["OutKast".into()],
            popularity: Some(80),
        }
    }

    #[tokio::test]
    async fn test_found_is_cached_by_normalized_key() {
        let search = FakeSearch::new(vec![hey_ya()]);
        let resolver = TrackResolver::new(search.clone(), 0.7, Duration::from_secs(60));

        let first = resolver
            .resolve(&PlaylistEntry::new("Outkast", "Hey Ya!"))
            .await
            .unwrap();
        let second = resolver
            .resolve(&PlaylistEntry::new("OUTKAST", "Hey Ya! (Radio Edit)"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(matches!(first, Resolution::Found(ref t) if t.track_id == "t1"));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_tries_every_query_then_caches() {
        let search = FakeSearch::new(vec![]);
        let resolver = TrackResolver::new(search.clone(), 0.7, Duration::from_secs(60));
        let entry = PlaylistEntry::new("Jay-Z & Beyoncé", "Crazy In Love");

        assert_eq!(resolver.resolve(&entry).await.unwrap(), Resolution::NotFound);
        assert_eq!(
            *search.queries.lock().unwrap(),
            vec![
                "Jay-Z & Beyoncé Crazy In Love".to_string(),
                "Jay-Z Crazy In Love".to_string(),
                "Crazy In Love".to_string(),
            ]
        );

        assert_eq!(resolver.resolve(&entry).await.unwrap(), Resolution::NotFound);
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_expires_after_ttl() {
        let search = FakeSearch::new(vec![]);
        let resolver = TrackResolver::new(search.clone(), 0.7, Duration::from_millis(50));
        let entry = PlaylistEntry::new("Outkast", "Hey Ya!");

        assert_eq!(resolver.resolve(&entry).await.unwrap(), Resolution::NotFound);
        search.results.lock().unwrap().push(hey_ya());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(matches!(
            resolver.resolve(&entry).await.unwrap(),
            Resolution::Found(_)
        ));
    }

    #[tokio::test]
    async fn test_search_failure_is_unavailable_and_not_cached() {
        let search = FakeSearch::new(vec![hey_ya()]);
        *search.fail.lock().unwrap() = true;
        let resolver = TrackResolver::new(search.clone(), 0.7, Duration::from_secs(60));
        let entry = PlaylistEntry::new("Outkast", "Hey Ya!");

        let err = resolver.resolve(&entry).await.unwrap_err();
        assert!(matches!(err, Error::ResolverUnavailable(_)));

        *search.fail.lock().unwrap() = false;
        assert!(matches!(
            resolver.resolve(&entry).await.unwrap(),
            Resolution::Found(_)
        ));
    }

    #[test]
    fn test_candidate_to_resolved_joins_artists() {
        let candidate = TrackCandidate {
            id: "x".into(),
            uri: "spotify:track:x".into(),
            name: "Crazy In Love".into(),
            artists: vec!["Beyoncé".into(), "JAY-Z".into()],
            popularity: None,
        };
        let track = candidate.to_resolved();
        assert_eq!(track.artist, "Beyoncé, JAY-Z");
        assert_eq!(track.track_id, "x");
    }
}
