//! Background watchdogs
//!
//! Two loops keep playback and the coordinator's mode consistent without a
//! human in the loop:
//! - [`Watchdog::run_song_requests`] polls on a fixed interval: it times out
//!   stuck requests, starts queued ones, returns to playback after the queue
//!   stays empty, and re-applies scene and playback actions that failed
//!   earlier.
//! - [`Watchdog::run_media_events`] reacts to the backend reporting that a
//!   requested file finished, moving on to the next request, and keeps the
//!   playback cursor in step when the rotation advances by itself.
//!
//! Both exit promptly when the shutdown token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use nightcast_common::{Mode, QueueKind};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::MediaEvent;
use crate::config::WatchdogConfig;
use crate::library::Library;
use crate::mode::ModeCoordinator;
use crate::playback::{MediaPlaybackAdapter, NextOutcome, PlaybackKey};
use crate::scene::SceneVisibility;

/// Consecutive empty polls in song-request mode before returning to playback
pub const IDLE_POLLS_BEFORE_RETURN: u32 = 2;

/// What one poll decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    Nothing,
    /// A request ran longer than the timeout and was abandoned
    TimedOut,
    /// A request was active while broadcast/PK holds the screen
    ClearedForPriority,
    /// A queued request was started
    StartedQueued(QueueKind),
    /// Song-request mode sat idle and the coordinator was asked to return
    ReturnedToPlayback,
    /// Idle poll counted towards the return
    Idle(u32),
}

/// Per-loop bookkeeping for the song-request poll
#[derive(Debug, Default)]
pub struct RequestTimer {
    started: Option<Instant>,
    idle_polls: u32,
}

pub struct Watchdog {
    coordinator: Arc<ModeCoordinator>,
    adapter: Arc<MediaPlaybackAdapter>,
    library: Arc<Library>,
    scene: Option<Arc<SceneVisibility>>,
    poll_interval: Duration,
    request_timeout: Duration,
}

impl Watchdog {
    pub fn new(
        coordinator: Arc<ModeCoordinator>,
        adapter: Arc<MediaPlaybackAdapter>,
        library: Arc<Library>,
        config: &WatchdogConfig,
    ) -> Self {
        Self {
            coordinator,
            adapter,
            library,
            scene: None,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            request_timeout: Duration::from_secs(config.song_request_timeout_secs),
        }
    }

    /// Also re-apply scene visibility the observer could not apply
    pub fn with_scene(mut self, scene: Arc<SceneVisibility>) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Poll loop; returns when `cancel` fires
    pub async fn run_song_requests(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Song request watchdog started (poll {:?}, timeout {:?})",
            self.poll_interval, self.request_timeout
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timer = RequestTimer::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let action = self.tick(&mut timer, Instant::now()).await;
            if !matches!(action, TickAction::Nothing | TickAction::Idle(_)) {
                debug!("Watchdog: {:?}", action);
            }
        }
        info!("Song request watchdog stopped");
    }

    /// One poll of the song-request watchdog
    pub async fn tick(&self, timer: &mut RequestTimer, now: Instant) -> TickAction {
        let action = self.evaluate(timer, now).await;
        if let Some(scene) = &self.scene {
            scene.reconcile().await;
        }
        self.adapter.reconcile().await;
        action
    }

    async fn evaluate(&self, timer: &mut RequestTimer, now: Instant) -> TickAction {
        let mode = self.coordinator.current_mode().await;

        if self.adapter.has_song_request().await {
            timer.idle_polls = 0;

            if matches!(mode, Mode::Broadcast | Mode::Pk) {
                timer.started = None;
                info!("Dropping song request: {} holds the screen", mode.key());
                self.adapter
                    .abandon_request(PlaybackKey::from_mode(mode))
                    .await;
                return TickAction::ClearedForPriority;
            }

            let started = *timer.started.get_or_insert(now);
            if now.saturating_duration_since(started) < self.request_timeout {
                return TickAction::Nothing;
            }

            timer.started = None;
            warn!(
                "Song request still playing after {:?}; abandoning it",
                self.request_timeout
            );
            if mode == Mode::SongRequest {
                if self.adapter.next_song().await == NextOutcome::Drained(QueueKind::Song) {
                    self.coordinator.auto_switch_for_song_request(0).await;
                }
            } else {
                self.adapter.clear_song_request().await;
            }
            return TickAction::TimedOut;
        }

        timer.started = None;
        let replay_waiting = mode == Mode::Playback
            && !self.library.replay_queue.is_empty()
            && !self.adapter.has_replay_request().await;

        match mode {
            Mode::SongRequest => {
                if !self.library.song_queue.is_empty() {
                    timer.idle_polls = 0;
                    return match self.adapter.play_next_request().await {
                        NextOutcome::Playing(name) => {
                            info!("Watchdog started queued request: {}", name);
                            TickAction::StartedQueued(QueueKind::Song)
                        }
                        _ => TickAction::Nothing,
                    };
                }

                timer.idle_polls += 1;
                if timer.idle_polls < IDLE_POLLS_BEFORE_RETURN {
                    return TickAction::Idle(timer.idle_polls);
                }
                timer.idle_polls = 0;
                self.coordinator.auto_switch_for_song_request(0).await;
                TickAction::ReturnedToPlayback
            }
            Mode::Playback if replay_waiting => {
                timer.idle_polls = 0;
                match self.adapter.play_next_replay().await {
                    NextOutcome::Playing(code) => {
                        info!("Watchdog started queued replay: {}", code);
                        TickAction::StartedQueued(QueueKind::Replay)
                    }
                    _ => TickAction::Nothing,
                }
            }
            _ => {
                timer.idle_polls = 0;
                TickAction::Nothing
            }
        }
    }

    /// Media-event loop; returns when `cancel` fires or the backend goes away
    pub async fn run_media_events(
        self: Arc<Self>,
        mut events: broadcast::Receiver<MediaEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => self.handle_media_event(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Media event listener lagged by {} event(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Media event watchdog stopped");
    }

    /// React to one backend media event
    pub async fn handle_media_event(&self, event: MediaEvent) {
        let source = match event {
            MediaEvent::PlaybackStarted { .. } => {
                self.adapter.media_started().await;
                return;
            }
            MediaEvent::PlaybackEnded { source } => source,
        };
        if !self.adapter.has_override().await {
            debug!("'{}' ended during rotation; nothing to do", source);
            return;
        }

        match self.adapter.next_song().await {
            NextOutcome::Playing(name) => info!("Next request: {}", name),
            NextOutcome::Drained(QueueKind::Song) => {
                self.coordinator.auto_switch_for_song_request(0).await;
            }
            NextOutcome::Drained(QueueKind::Replay) => info!("Replay requests finished"),
            NextOutcome::Skipped => {}
            NextOutcome::Failed => warn!("Could not advance after '{}' ended", source),
        }
    }
}
