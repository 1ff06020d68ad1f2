//! Media library index
//!
//! Owns everything the daemon knows about the files it can play:
//! - [`SongLibrary`]: requestable songs, searched by keyword
//! - [`ReplayLibrary`]: recorded shows, looked up by `YYYYMMDDNN` code
//! - one [`RequestQueue`] per library for listener requests
//! - [`NowPlaying`]: the caption shown by the overlay

mod now_playing;
mod queue;
mod replays;
mod songs;

use std::path::Path;

use nightcast_common::{EventBus, QueueKind};

pub use now_playing::{NowPlaying, NOW_PLAYING_IDLE};
pub use queue::{QueueEntry, RequestQueue};
pub use replays::{parse_replay_code, ReplayLibrary};
pub use songs::SongLibrary;

/// Songs, replays, their request queues and the now-playing caption
pub struct Library {
    pub songs: SongLibrary,
    pub song_queue: RequestQueue,
    pub replays: ReplayLibrary,
    pub replay_queue: RequestQueue,
    pub now_playing: NowPlaying,
}

impl Library {
    /// Index `song_dir` and `replay_dir` (each scanned once)
    pub fn open(
        song_dir: &Path,
        replay_dir: Option<&Path>,
        now_playing_file: Option<&Path>,
        events: EventBus,
    ) -> Self {
        Self {
            songs: SongLibrary::open(song_dir),
            song_queue: RequestQueue::new(QueueKind::Song, events.clone()),
            replays: ReplayLibrary::open(replay_dir),
            replay_queue: RequestQueue::new(QueueKind::Replay, events.clone()),
            now_playing: NowPlaying::new(now_playing_file.map(Path::to_path_buf), events),
        }
    }

    /// Request queue for one kind
    pub fn queue(&self, kind: QueueKind) -> &RequestQueue {
        match kind {
            QueueKind::Song => &self.song_queue,
            QueueKind::Replay => &self.replay_queue,
        }
    }

    /// Re-scan both directories
    pub fn rebuild(&self) {
        self.songs.rebuild();
        self.replays.rebuild();
    }
}

/// Display name for a media file: its stem, lossily decoded
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Lower-cased extension of `path`, if any
fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_is_file_stem() {
        assert_eq!(display_name(Path::new("/a/b/晴天.mp4")), "晴天");
        assert_eq!(display_name(Path::new("noext")), "noext");
    }

    #[test]
    fn test_queue_lookup_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::open(dir.path(), None, None, EventBus::new(8));
        assert_eq!(library.queue(QueueKind::Song).kind(), QueueKind::Song);
        assert_eq!(library.queue(QueueKind::Replay).kind(), QueueKind::Replay);
    }
}
