//! Sync engine
//!
//! Two independently scheduled passes share one [`QueueState`]:
//!
//! - **Add-sync** (every poll interval): fetch the playlist, resolve the
//!   newest entries in play order, and add every track that is not queued yet.
//!   A track is recorded only after the downstream add succeeded.
//! - **Cleanup** (every cleanup interval): remove downstream the records that
//!   have not been seen upstream for the retention window, then drop the
//!   records whose removal succeeded.
//!
//! Passes never overlap. One entry's failure never aborts the rest of a pass,
//! and nothing here ever starts playback.

use crate::audit::AuditSink;
use crate::config::SyncConfig;
use crate::downstream::DownstreamQueue;
use crate::error::{Error, Result};
use crate::queue_state::QueueState;
use crate::resolver::{Resolution, TrackResolver};
use crate::source::PlaylistSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use vjn_common::{time, PlaylistEntry, QueueRecord, ResolvedTrack};

/// Queue state shared between the engine and read-only observers
pub type SharedQueueState = Arc<Mutex<QueueState>>;

/// Outcome of one add-sync pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Entries inside the window
    pub considered: usize,
    pub added: usize,
    pub already_queued: usize,
    pub not_found: usize,
    /// Resolver or downstream failures, retried next pass
    pub failed: usize,
}

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    /// Records past retention and absent upstream
    pub candidates: usize,
    pub removed: usize,
    /// Removals that failed downstream; kept for the next cleanup
    pub failed: usize,
    /// False when the playlist could not be fetched and age alone decided
    pub checked_upstream: bool,
}

enum EntryOutcome {
    Added,
    AlreadyQueued,
    NotFound,
}

pub struct SyncEngine {
    state: SharedQueueState,
    source: Arc<dyn PlaylistSource>,
    resolver: TrackResolver,
    downstream: Arc<dyn DownstreamQueue>,
    audit: Option<Arc<dyn AuditSink>>,
    config: SyncConfig,
    /// Set after the first add-sync that got a playlist
    seeded: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    /// Keeps add-sync and cleanup from interleaving
    pass_lock: tokio::sync::Mutex<()>,
    audit_tasks: Mutex<JoinSet<()>>,
}

/// Bound a future by `limit`, mapping expiry through `on_timeout`
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    on_timeout: fn(String) -> Error,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("{} timed out after {:?}", what, limit))),
    }
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn PlaylistSource>,
        resolver: TrackResolver,
        downstream: Arc<dyn DownstreamQueue>,
        config: SyncConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::new())),
            source,
            resolver,
            downstream,
            audit: None,
            config,
            seeded: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            pass_lock: tokio::sync::Mutex::new(()),
            audit_tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Handle for read-only access to the queue state
    pub fn queue_state(&self) -> SharedQueueState {
        Arc::clone(&self.state)
    }

    pub fn snapshot(&self) -> Vec<QueueRecord> {
        self.lock_state().snapshot()
    }

    pub fn downstream_name(&self) -> &'static str {
        self.downstream.name()
    }

    /// Time of the last add-sync that fetched a playlist
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolution may run several searches, each with its own request bound
    fn resolve_budget(&self) -> Duration {
        self.config.request_timeout * 4
    }

    pub async fn run_add_sync(&self) -> Result<SyncReport> {
        self.run_add_sync_at(time::now()).await
    }

    /// Add-sync with an explicit clock
    pub async fn run_add_sync_at(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        let _pass = self.pass_lock.lock().await;

        let entries = bounded(
            self.config.request_timeout,
            "Playlist fetch",
            Error::SourceUnavailable,
            self.source.fetch(),
        )
        .await?;

        let seeded = self.seeded.load(Ordering::SeqCst);
        let window = if seeded {
            self.config.poll_window
        } else {
            self.config.seed_window
        };
        let start = entries.len().saturating_sub(window);
        let (older, recent) = entries.split_at(start);

        info!(
            fetched = entries.len(),
            window = recent.len(),
            seed = !seeded,
            "Add-sync started"
        );

        let mut report = SyncReport::default();
        for entry in recent {
            report.considered += 1;
            match self.sync_entry(entry, now).await {
                Ok(EntryOutcome::Added) => report.added += 1,
                Ok(EntryOutcome::AlreadyQueued) => report.already_queued += 1,
                Ok(EntryOutcome::NotFound) => report.not_found += 1,
                Err(e) => {
                    warn!(entry = %entry, error = %e, "Entry not synced, retrying next pass");
                    report.failed += 1;
                }
            }
        }

        // Entries outside the window still count as seen upstream
        self.touch_cached(older, now).await;

        if !entries.is_empty() {
            self.seeded.store(true, Ordering::SeqCst);
        }
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);

        info!(
            added = report.added,
            already_queued = report.already_queued,
            not_found = report.not_found,
            failed = report.failed,
            "Add-sync finished"
        );
        Ok(report)
    }

    async fn sync_entry(&self, entry: &PlaylistEntry, now: DateTime<Utc>) -> Result<EntryOutcome> {
        let resolution = bounded(
            self.resolve_budget(),
            "Track resolution",
            Error::ResolverUnavailable,
            self.resolver.resolve(entry),
        )
        .await?;

        let track = match resolution {
            Resolution::Found(track) => track,
            Resolution::NotFound => return Ok(EntryOutcome::NotFound),
        };

        if self.lock_state().touch(&track.track_id, now) {
            debug!(track_id = %track.track_id, "Already queued");
            return Ok(EntryOutcome::AlreadyQueued);
        }

        bounded(
            self.config.request_timeout,
            "Downstream add",
            Error::DownstreamUnavailable,
            self.downstream.enqueue(&track),
        )
        .await?;

        self.lock_state().record(&track, now);
        info!(
            track_id = %track.track_id,
            artist = %track.artist,
            title = %track.title,
            "Added to {} queue",
            self.downstream.name()
        );

        self.spawn_audit(&track);
        Ok(EntryOutcome::Added)
    }

    /// Refresh `last_seen` of queued tracks among `entries` without searching
    async fn touch_cached(&self, entries: &[PlaylistEntry], now: DateTime<Utc>) -> HashSet<String> {
        let mut seen = HashSet::new();
        for entry in entries {
            if let Some(track) = self.resolver.cached(entry).await {
                seen.insert(track.track_id);
            }
        }
        let mut state = self.lock_state();
        for id in &seen {
            state.touch(id, now);
        }
        seen
    }

    fn spawn_audit(&self, track: &ResolvedTrack) {
        let Some(sink) = self.audit.as_ref().map(Arc::clone) else {
            return;
        };
        let track = track.clone();
        let mut tasks = self.audit_tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match sink.log_add(&track).await {
                Ok(record) => debug!(
                    track_id = %record.track_id,
                    times_added = record.times_added,
                    "Audit log updated"
                ),
                Err(e) => warn!(track_id = %track.track_id, error = %e, "Audit log write failed"),
            }
        });
    }

    /// Wait for pending audit writes
    pub async fn flush_audit(&self) {
        let mut tasks = std::mem::take(
            &mut *self.audit_tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while tasks.join_next().await.is_some() {}
    }

    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        self.run_cleanup_at(time::now()).await
    }

    /// Cleanup with an explicit clock
    pub async fn run_cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let _pass = self.pass_lock.lock().await;
        let mut report = CleanupReport::default();

        let fetched = bounded(
            self.config.request_timeout,
            "Playlist fetch",
            Error::SourceUnavailable,
            self.source.fetch(),
        )
        .await;

        let upstream = match fetched {
            Ok(entries) => {
                report.checked_upstream = true;
                Some(self.touch_cached(&entries, now).await)
            }
            Err(e) => {
                warn!(error = %e, "Playlist unavailable, cleaning up by age only");
                None
            }
        };

        let cutoff = time::cutoff(now, self.config.retention);
        let candidates: Vec<QueueRecord> = self
            .lock_state()
            .stale(cutoff)
            .into_iter()
            .filter(|r| upstream.as_ref().map_or(true, |ids| !ids.contains(&r.track_id)))
            .collect();
        report.candidates = candidates.len();

        info!(
            candidates = candidates.len(),
            cutoff = %time::log_stamp(cutoff),
            "Cleanup started"
        );

        let mut removed = Vec::with_capacity(candidates.len());
        for record in &candidates {
            let result = bounded(
                self.config.request_timeout,
                "Downstream removal",
                Error::DownstreamUnavailable,
                self.downstream.remove(record),
            )
            .await;
            match result {
                Ok(()) => {
                    debug!(track_id = %record.track_id, "Removed from downstream queue");
                    removed.push(record.track_id.clone());
                }
                Err(e) => {
                    warn!(track_id = %record.track_id, error = %e, "Removal failed, keeping record");
                    report.failed += 1;
                }
            }
        }

        report.removed = self.lock_state().remove_ids(&removed);
        info!(removed = report.removed, failed = report.failed, "Cleanup finished");
        Ok(report)
    }

    /// Start the add-sync and cleanup timers
    ///
    /// Add-sync runs immediately and then every poll interval; the first
    /// cleanup runs one cleanup interval after start.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let add_engine = Arc::clone(self);
        let add_sync = tokio::spawn(async move {
            let mut tick = interval(add_engine.config.poll_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                match add_engine.run_add_sync().await {
                    Ok(_) => {}
                    Err(e) if e.is_transient() => warn!(error = %e, "Add-sync skipped"),
                    Err(e) => error!(error = %e, "Add-sync failed"),
                }
            }
        });

        let cleanup_engine = Arc::clone(self);
        let cleanup = tokio::spawn(async move {
            let period = cleanup_engine.config.cleanup_interval;
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = cleanup_engine.run_cleanup().await {
                    error!(error = %e, "Cleanup failed");
                }
            }
        });

        vec![add_sync, cleanup]
    }
}
