//! Media playback adapter
//!
//! Owns what the media source should be playing. State machine per
//! [`PlaybackKey`]:
//!
//! | entering      | action                                                  |
//! |---------------|---------------------------------------------------------|
//! | `video`       | restore snapshot, else rotate the playback directory   |
//! | `music`       | restore snapshot, else stop and wait for `play()`       |
//! | `replay`      | restore snapshot, else rotate the replay directory     |
//! | `broadcast`, `pk`, `other` | stop                                       |
//!
//! Before leaving a resumable key with a non-empty playlist, its playlist
//! and current file are saved as a [`PlaybackSnapshot`]. Snapshots are
//! consumed when restored. The current file follows skips and the
//! backend's own advance through the playlist
//! ([`media_started`](MediaPlaybackAdapter::media_started)).
//!
//! Capability failures never unwind: they are logged, the operation
//! returns `false`, and the intended action is remembered so
//! [`reconcile`](MediaPlaybackAdapter::reconcile) can re-apply it later.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nightcast_common::{Mode, QueueKind};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{scan_media_dir, NextOutcome, PlaybackKey, PlaybackSnapshot};
use crate::capability::{CapabilityAdapter, MediaAction};
use crate::error::{Error, Result};
use crate::library::{display_name, Library, QueueEntry};
use crate::mode::ModeObserver;

/// Directories the adapter rotates through
#[derive(Debug, Clone)]
pub struct MediaDirs {
    pub playback: PathBuf,
    pub replay: Option<PathBuf>,
}

impl MediaDirs {
    fn base_dir(&self, key: PlaybackKey) -> Option<&Path> {
        match key {
            PlaybackKey::Video => Some(&self.playback),
            PlaybackKey::Replay => self.replay.as_deref(),
            _ => None,
        }
    }
}

/// Single-file interrupt currently on the media source
#[derive(Debug, Clone)]
enum Override {
    Song(PathBuf),
    /// `return_to` is the key whose playback resumes when replays run out
    Replay { file: PathBuf, return_to: PlaybackKey },
}

/// Action that failed on the backend and should be re-applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    /// Push the current playlist, starting at the cursor
    Load,
    Stop,
}

struct AdapterState {
    current_key: PlaybackKey,
    playlist: Vec<PathBuf>,
    cursor: Option<usize>,
    override_file: Option<Override>,
    snapshots: HashMap<PlaybackKey, PlaybackSnapshot>,
    scan_cache: HashMap<PlaybackKey, Vec<PathBuf>>,
    pending: Option<PendingAction>,
    /// The next start reported by the backend is the entry we just chose
    awaiting_start: bool,
}

impl AdapterState {
    fn current_file(&self) -> Option<&PathBuf> {
        self.cursor.and_then(|i| self.playlist.get(i))
    }

    /// Playlist rotated so the cursor's file comes first
    fn order_from_cursor(&self) -> Vec<PathBuf> {
        let mut order = self.playlist.clone();
        if let Some(i) = self.cursor.filter(|&i| i < order.len()) {
            order.rotate_left(i);
        }
        order
    }
}

/// Read-only view for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    pub key: &'static str,
    pub now_playing: String,
    pub current_file: Option<PathBuf>,
    pub playlist_len: usize,
    pub song_request: Option<PathBuf>,
    pub replay_request: Option<PathBuf>,
    pub snapshots: Vec<&'static str>,
    pub cached_scans: HashMap<&'static str, usize>,
    pub pending: bool,
}

/// Drives the capability backend for every playback key
pub struct MediaPlaybackAdapter {
    capability: Arc<dyn CapabilityAdapter>,
    library: Arc<Library>,
    dirs: MediaDirs,
    state: Mutex<AdapterState>,
}

impl MediaPlaybackAdapter {
    pub fn new(capability: Arc<dyn CapabilityAdapter>, library: Arc<Library>, dirs: MediaDirs) -> Self {
        Self {
            capability,
            library,
            dirs,
            state: Mutex::new(AdapterState {
                current_key: PlaybackKey::Other,
                playlist: Vec::new(),
                cursor: None,
                override_file: None,
                snapshots: HashMap::new(),
                scan_cache: HashMap::new(),
                pending: None,
                awaiting_start: false,
            }),
        }
    }

    // ========================================
    // Mode transitions
    // ========================================

    /// Leave `old` and enter `new`
    ///
    /// Returns whether the backend accepted the resulting playback action.
    pub async fn transition_to_mode(&self, old: PlaybackKey, new: PlaybackKey) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        if st.current_key != old {
            debug!(
                "Playback was in {} while leaving {}; snapshotting {}",
                st.current_key, old, st.current_key
            );
        }

        info!("Playback transition: {} -> {}", old, new);
        if new.takes_screen() && matches!(st.override_file, Some(Override::Song(_))) {
            // The streamer took over; the request is not resumed afterwards
            info!("Dropping song request for {}", new);
            st.snapshots.remove(&PlaybackKey::Music);
        } else {
            self.save_snapshot(st);
        }
        st.override_file = None;
        st.current_key = new;
        self.enter(st, new).await
    }

    /// Transition from wherever playback is to `key`, unless already there
    pub async fn resync(&self, key: PlaybackKey) -> bool {
        let current = self.current_key().await;
        if current == key {
            return true;
        }
        self.transition_to_mode(current, key).await
    }

    async fn enter(&self, st: &mut AdapterState, key: PlaybackKey) -> bool {
        match key {
            PlaybackKey::Video | PlaybackKey::Replay => self.restore_or_rotate(st, key).await,
            PlaybackKey::Music => match st.snapshots.remove(&PlaybackKey::Music) {
                Some(snapshot) => self.restore(st, snapshot).await,
                None => {
                    debug!("Song request playback idle until a request arrives");
                    st.playlist.clear();
                    st.cursor = None;
                    self.apply_stop(st).await
                }
            },
            PlaybackKey::Broadcast | PlaybackKey::Pk | PlaybackKey::Other => {
                st.playlist.clear();
                st.cursor = None;
                self.apply_stop(st).await
            }
        }
    }

    fn save_snapshot(&self, st: &mut AdapterState) {
        let key = st.current_key;
        // The rotation under a replay request was saved when the request started
        if !key.is_resumable()
            || st.playlist.is_empty()
            || matches!(st.override_file, Some(Override::Replay { .. }))
        {
            return;
        }

        let snapshot = PlaybackSnapshot::new(st.playlist.clone(), st.current_file().cloned());
        debug!(
            "Saved {} snapshot at {:?} ({} file(s))",
            key,
            snapshot.current_file(),
            snapshot.playlist().len()
        );
        st.snapshots.insert(key, snapshot);
    }

    async fn restore_or_rotate(&self, st: &mut AdapterState, key: PlaybackKey) -> bool {
        match st.snapshots.remove(&key) {
            Some(snapshot) => self.restore(st, snapshot).await,
            None => self.rotate_fresh(st, key).await,
        }
    }

    async fn restore(&self, st: &mut AdapterState, snapshot: PlaybackSnapshot) -> bool {
        info!(
            "Resuming {} at {:?}",
            st.current_key,
            snapshot.current_file().map(display_name)
        );
        let order = snapshot.resume_order();
        if st.current_key == PlaybackKey::Music {
            st.override_file = order.first().cloned().map(Override::Song);
        }
        self.load(st, order).await
    }

    /// Rescan the key's directory and play it from the first file
    async fn rotate_fresh(&self, st: &mut AdapterState, key: PlaybackKey) -> bool {
        let Some(dir) = self.dirs.base_dir(key).map(Path::to_path_buf) else {
            warn!("No directory configured for {} playback", key);
            st.playlist.clear();
            st.cursor = None;
            return self.apply_stop(st).await;
        };

        let files = scan(dir).await;
        st.scan_cache.insert(key, files.clone());

        if files.is_empty() {
            st.playlist.clear();
            st.cursor = None;
            return self.apply_stop(st).await;
        }

        info!("Rotating {} file(s) for {}", files.len(), key);
        self.load(st, files).await
    }

    // ========================================
    // Requests
    // ========================================

    /// Interrupt whatever is playing with a single requested song
    ///
    /// Returns `false` without touching playback state when the file does
    /// not exist.
    pub async fn play(&self, file: &Path) -> bool {
        if let Err(e) = ensure_file(file) {
            warn!("Cannot play request: {}", e);
            return false;
        }
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        self.start_song(st, file.to_path_buf()).await
    }

    /// Interrupt whatever is playing with a single recorded show
    pub async fn play_replay(&self, file: &Path) -> bool {
        if let Err(e) = ensure_file(file) {
            warn!("Cannot play replay: {}", e);
            return false;
        }
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let return_to = match st.override_file {
            Some(Override::Replay { return_to, .. }) => return_to,
            _ => {
                self.save_snapshot(st);
                base_key(st.current_key)
            }
        };
        self.start_replay(st, file.to_path_buf(), return_to).await
    }

    async fn start_song(&self, st: &mut AdapterState, file: PathBuf) -> bool {
        if st.override_file.is_none() {
            self.save_snapshot(st);
        }
        info!("Playing song request: {}", display_name(&file));
        st.override_file = Some(Override::Song(file.clone()));
        st.current_key = PlaybackKey::Music;
        self.load(st, vec![file]).await
    }

    async fn start_replay(&self, st: &mut AdapterState, file: PathBuf, return_to: PlaybackKey) -> bool {
        info!("Playing replay: {}", display_name(&file));
        st.override_file = Some(Override::Replay {
            file: file.clone(),
            return_to,
        });
        st.current_key = PlaybackKey::Replay;
        self.load(st, vec![file]).await
    }

    /// Advance to the next thing to play
    ///
    /// With a request active this pops the matching request queue; when
    /// the song queue is empty the override is cleared and
    /// [`NextOutcome::Drained`] tells the caller to leave song-request mode.
    /// An empty replay queue resumes the playback the replay interrupted.
    /// Without a request the rotation is skipped forward.
    pub async fn next_song(&self) -> NextOutcome {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;

        if let Some(Override::Replay { return_to, .. }) = st.override_file {
            return match self.library.replay_queue.pop() {
                Some(entry) => self.start_queued(st, entry, QueueKind::Replay, return_to).await,
                None => {
                    info!("Replay queue empty; resuming {}", return_to);
                    st.override_file = None;
                    st.current_key = return_to;
                    self.enter(st, return_to).await;
                    NextOutcome::Drained(QueueKind::Replay)
                }
            };
        }

        if st.current_key == PlaybackKey::Music {
            return match self.library.song_queue.pop() {
                Some(entry) => {
                    self.start_queued(st, entry, QueueKind::Song, PlaybackKey::Music)
                        .await
                }
                None => {
                    info!("Song request queue empty");
                    // Finished requests are not resumed
                    st.override_file = None;
                    st.playlist.clear();
                    st.cursor = None;
                    NextOutcome::Drained(QueueKind::Song)
                }
            };
        }

        if self.skip(st, MediaAction::Next).await {
            NextOutcome::Skipped
        } else {
            NextOutcome::Failed
        }
    }

    /// Pop the next song request and play it, whatever is playing now
    pub async fn play_next_request(&self) -> NextOutcome {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        match self.library.song_queue.pop() {
            Some(entry) => {
                self.start_queued(st, entry, QueueKind::Song, PlaybackKey::Music)
                    .await
            }
            None => NextOutcome::Drained(QueueKind::Song),
        }
    }

    /// Pop the next replay request and play it, whatever is playing now
    pub async fn play_next_replay(&self) -> NextOutcome {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        match self.library.replay_queue.pop() {
            Some(entry) => {
                let return_to = match st.override_file {
                    Some(Override::Replay { return_to, .. }) => return_to,
                    _ => {
                        self.save_snapshot(st);
                        base_key(st.current_key)
                    }
                };
                self.start_queued(st, entry, QueueKind::Replay, return_to).await
            }
            None => NextOutcome::Drained(QueueKind::Replay),
        }
    }

    async fn start_queued(
        &self,
        st: &mut AdapterState,
        entry: QueueEntry,
        kind: QueueKind,
        return_to: PlaybackKey,
    ) -> NextOutcome {
        if let Err(e) = ensure_file(&entry.path) {
            warn!("Dropping queued request '{}': {}", entry.display_name, e);
            return NextOutcome::Failed;
        }

        let started = match kind {
            QueueKind::Song => self.start_song(st, entry.path).await,
            QueueKind::Replay => self.start_replay(st, entry.path, return_to).await,
        };

        if started {
            NextOutcome::Playing(entry.display_name)
        } else {
            NextOutcome::Failed
        }
    }

    /// Skip the rotation backwards
    pub async fn previous(&self) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        self.skip(st, MediaAction::Previous).await
    }

    async fn skip(&self, st: &mut AdapterState, action: MediaAction) -> bool {
        if let Err(e) = self.capability.trigger_media_action(action).await {
            warn!("Failed to skip ({:?}): {}", action, e);
            return false;
        }

        let len = st.playlist.len();
        if len > 0 {
            let i = st.cursor.unwrap_or(0);
            st.cursor = Some(match action {
                MediaAction::Previous => (i + len - 1) % len,
                _ => (i + 1) % len,
            });
            st.awaiting_start = true;
            self.announce(st).await;
        }
        true
    }

    /// The backend started a playlist entry
    ///
    /// The first start after a load or skip is the entry the adapter chose.
    /// Any later one means the source moved on by itself, so the cursor
    /// advances with it. Returns whether the cursor moved.
    pub async fn media_started(&self) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        if std::mem::take(&mut st.awaiting_start) {
            return false;
        }

        let len = st.playlist.len();
        if len < 2 {
            return false;
        }
        let i = st.cursor.unwrap_or(0);
        st.cursor = Some((i + 1) % len);
        debug!("Media source advanced to entry {} of {}", (i + 1) % len, len);
        self.announce(st).await;
        true
    }

    /// Drop any active request and restart base playback from scratch
    ///
    /// Returns `false` (and does nothing) when no request is active.
    pub async fn clear_song_request(&self) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let Some(cleared) = st.override_file.take() else {
            return false;
        };

        let base = match cleared {
            Override::Song(_) => PlaybackKey::Video,
            Override::Replay { return_to, .. } => return_to,
        };
        info!("Request cleared; restarting {} playback", base);

        st.current_key = base;
        st.snapshots.remove(&base);
        match base {
            PlaybackKey::Video | PlaybackKey::Replay => {
                self.rotate_fresh(st, base).await;
            }
            other => {
                self.enter(st, other).await;
            }
        }
        true
    }

    /// Discard the active request without resuming it later and settle
    /// on `key`
    pub async fn abandon_request(&self, key: PlaybackKey) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        if st.override_file.take().is_none() {
            return false;
        }

        info!("Request abandoned; settling on {}", key);
        st.playlist.clear();
        st.cursor = None;
        st.snapshots.remove(&PlaybackKey::Music);
        st.current_key = key;
        self.enter(st, key).await;
        true
    }

    pub async fn stop(&self) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        self.apply_stop(st).await
    }

    /// Re-apply a playback action that failed earlier
    ///
    /// Returns `true` when a pending action was applied successfully.
    pub async fn reconcile(&self) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let Some(pending) = st.pending else {
            return false;
        };
        if !self.capability.check_connection().await {
            debug!("Backend still unavailable; keeping pending {:?}", pending);
            return false;
        }

        info!("Re-applying pending playback action: {:?}", pending);
        match pending {
            PendingAction::Stop => self.apply_stop(st).await,
            PendingAction::Load => {
                let order = st.order_from_cursor();
                self.load(st, order).await
            }
        }
    }

    // ========================================
    // Backend plumbing
    // ========================================

    async fn load(&self, st: &mut AdapterState, files: Vec<PathBuf>) -> bool {
        st.cursor = if files.is_empty() { None } else { Some(0) };
        st.playlist = files;

        match self.push(&st.playlist).await {
            Ok(()) => {
                st.pending = None;
                st.awaiting_start = !st.playlist.is_empty();
                self.announce(st).await;
                true
            }
            Err(e) => {
                warn!(
                    "Failed to load {} playlist ({} file(s)): {}",
                    st.current_key,
                    st.playlist.len(),
                    e
                );
                st.pending = Some(PendingAction::Load);
                false
            }
        }
    }

    async fn push(&self, files: &[PathBuf]) -> Result<()> {
        self.capability.set_playlist(files).await?;
        self.capability.trigger_media_action(MediaAction::Restart).await
    }

    async fn apply_stop(&self, st: &mut AdapterState) -> bool {
        match self.capability.trigger_media_action(MediaAction::Stop).await {
            Ok(()) => {
                st.pending = None;
                st.awaiting_start = false;
                true
            }
            Err(e) => {
                warn!("Failed to stop media: {}", e);
                st.pending = Some(PendingAction::Stop);
                false
            }
        }
    }

    async fn announce(&self, st: &AdapterState) {
        if let Some(file) = st.current_file() {
            self.library.now_playing.set(&display_name(file)).await;
        }
    }

    // ========================================
    // Queries
    // ========================================

    pub async fn current_key(&self) -> PlaybackKey {
        self.state.lock().await.current_key
    }

    pub async fn has_override(&self) -> bool {
        self.state.lock().await.override_file.is_some()
    }

    pub async fn has_song_request(&self) -> bool {
        matches!(self.state.lock().await.override_file, Some(Override::Song(_)))
    }

    pub async fn has_replay_request(&self) -> bool {
        matches!(
            self.state.lock().await.override_file,
            Some(Override::Replay { .. })
        )
    }

    pub fn now_playing(&self) -> String {
        self.library.now_playing.get()
    }

    pub async fn status(&self) -> PlaybackStatus {
        let st = self.state.lock().await;
        let (song_request, replay_request) = match &st.override_file {
            Some(Override::Song(file)) => (Some(file.clone()), None),
            Some(Override::Replay { file, .. }) => (None, Some(file.clone())),
            None => (None, None),
        };

        PlaybackStatus {
            key: st.current_key.key(),
            now_playing: self.library.now_playing.get(),
            current_file: st.current_file().cloned(),
            playlist_len: st.playlist.len(),
            song_request,
            replay_request,
            snapshots: st.snapshots.keys().map(|k| k.key()).collect(),
            cached_scans: st
                .scan_cache
                .iter()
                .map(|(k, files)| (k.key(), files.len()))
                .collect(),
            pending: st.pending.is_some(),
        }
    }
}

#[async_trait]
impl ModeObserver for MediaPlaybackAdapter {
    fn name(&self) -> &str {
        "media-playback"
    }

    async fn on_mode_change(&self, old: Mode, new: Mode, _reason: &str) -> anyhow::Result<()> {
        self.transition_to_mode(PlaybackKey::from_mode(old), PlaybackKey::from_mode(new))
            .await;
        Ok(())
    }
}

/// Key whose playback a replay request returns to
fn base_key(key: PlaybackKey) -> PlaybackKey {
    match key {
        PlaybackKey::Replay => PlaybackKey::Replay,
        _ => PlaybackKey::Video,
    }
}

fn ensure_file(file: &Path) -> Result<()> {
    if file.is_file() {
        Ok(())
    } else {
        Err(Error::NotFound(format!("media file {}", file.display())))
    }
}

async fn scan(dir: PathBuf) -> Vec<PathBuf> {
    tokio::task::spawn_blocking(move || scan_media_dir(&dir))
        .await
        .unwrap_or_else(|e| {
            error!("Directory scan task failed: {}", e);
            Vec::new()
        })
}
