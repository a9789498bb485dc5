//! Playback control
//!
//! A three-state machine driven only by the control API:
//!
//! ```text
//! Stopped --play--> Loaded --(resume)--> Playing
//! Loaded/Playing --play--> Playing
//! Stopped (after the first load) --play--> Playing
//! Loaded/Playing --stop--> Stopped
//! ```
//!
//! The first `play` hands the current queue snapshot to the player, then
//! starts it. Later plays only resume: tracks added since then were already
//! queued by the sync engine. Stopping while stopped makes no player call.
//! A failing player call leaves the state where the last successful step
//! put it. The queue state is only ever read here.

use crate::downstream::DownstreamQueue;
use crate::engine::{bounded, SharedQueueState};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::info;
use vjn_common::PlaybackState;

pub struct PlaybackController {
    state: RwLock<PlaybackState>,
    /// Set once the player received the queue snapshot
    handed_over: AtomicBool,
    /// Serializes control commands; `status` never waits on it
    control: tokio::sync::Mutex<()>,
    queue: SharedQueueState,
    downstream: Arc<dyn DownstreamQueue>,
    request_timeout: Duration,
}

impl PlaybackController {
    pub fn new(
        queue: SharedQueueState,
        downstream: Arc<dyn DownstreamQueue>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(PlaybackState::Stopped),
            handed_over: AtomicBool::new(false),
            control: tokio::sync::Mutex::new(()),
            queue,
            downstream,
            request_timeout,
        }
    }

    pub fn status(&self) -> PlaybackState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: PlaybackState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            info!(from = %*state, to = %next, "Playback state changed");
            *state = next;
        }
    }

    fn queued_uris(&self) -> Vec<String> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
            .into_iter()
            .map(|record| record.uri)
            .collect()
    }

    pub async fn play(&self) -> Result<PlaybackState> {
        let _control = self.control.lock().await;

        if !self.handed_over.load(Ordering::SeqCst) {
            let uris = self.queued_uris();
            info!(tracks = uris.len(), "Loading queue into player");
            bounded(
                self.request_timeout,
                "Player load",
                Error::PlaybackUnavailable,
                self.downstream.load(&uris),
            )
            .await?;
            self.handed_over.store(true, Ordering::SeqCst);
            self.set(PlaybackState::Loaded);
        }

        bounded(
            self.request_timeout,
            "Player resume",
            Error::PlaybackUnavailable,
            self.downstream.resume(),
        )
        .await?;
        self.set(PlaybackState::Playing);
        Ok(PlaybackState::Playing)
    }

    pub async fn stop(&self) -> Result<PlaybackState> {
        let _control = self.control.lock().await;

        if self.status() == PlaybackState::Stopped {
            return Ok(PlaybackState::Stopped);
        }

        bounded(
            self.request_timeout,
            "Player pause",
            Error::PlaybackUnavailable,
            self.downstream.pause(),
        )
        .await?;
        self.set(PlaybackState::Stopped);
        Ok(PlaybackState::Stopped)
    }
}
