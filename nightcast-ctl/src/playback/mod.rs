//! Media playback
//!
//! Translates abstract mode transitions into concrete playback on the
//! capability backend: rotating a directory, interrupting with a single
//! requested file, and snapshotting/restoring rotation position across
//! mode switches.

mod adapter;
mod scan;
mod snapshot;

use std::fmt;

use nightcast_common::{Mode, QueueKind};

pub use adapter::{MediaDirs, MediaPlaybackAdapter, PlaybackStatus};
pub use scan::{scan_media_dir, MEDIA_EXTENSIONS};
pub use snapshot::PlaybackSnapshot;

/// Playback-side mode key
///
/// Coordinator modes map onto these; `Replay` has no coordinator mode and is
/// entered by replay requests and operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackKey {
    /// Directory rotation (coordinator `playback`)
    Video,
    /// Listener-requested songs (coordinator `song_request`)
    Music,
    /// Recorded shows
    Replay,
    Broadcast,
    Pk,
    Other,
}

impl PlaybackKey {
    pub fn from_mode(mode: Mode) -> Self {
        match mode {
            Mode::Playback => PlaybackKey::Video,
            Mode::SongRequest => PlaybackKey::Music,
            Mode::Broadcast => PlaybackKey::Broadcast,
            Mode::Pk => PlaybackKey::Pk,
            Mode::Other => PlaybackKey::Other,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            PlaybackKey::Video => "video",
            PlaybackKey::Music => "music",
            PlaybackKey::Replay => "replay",
            PlaybackKey::Broadcast => "broadcast",
            PlaybackKey::Pk => "pk",
            PlaybackKey::Other => "other",
        }
    }

    /// Parse a key, accepting the coordinator aliases `playback` and `song_request`
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim() {
            "video" | "playback" => Some(PlaybackKey::Video),
            "music" | "song_request" => Some(PlaybackKey::Music),
            "replay" => Some(PlaybackKey::Replay),
            "broadcast" => Some(PlaybackKey::Broadcast),
            "pk" => Some(PlaybackKey::Pk),
            "other" => Some(PlaybackKey::Other),
            _ => None,
        }
    }

    /// Keys whose playlist is snapshotted when left
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            PlaybackKey::Video | PlaybackKey::Music | PlaybackKey::Replay
        )
    }

    /// Keys where the streamer is on screen and requests are dropped
    pub fn takes_screen(self) -> bool {
        matches!(self, PlaybackKey::Broadcast | PlaybackKey::Pk)
    }
}

impl fmt::Display for PlaybackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Result of [`MediaPlaybackAdapter::next_song`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    /// A queued request started; carries its display name
    Playing(String),
    /// The request queue was empty; the override has been cleared
    Drained(QueueKind),
    /// The rotation was skipped forward
    Skipped,
    /// The backend call failed
    Failed,
}
