//! Playback position snapshot

use std::path::{Path, PathBuf};

/// Where a resumable mode was when it was left
///
/// `current_file`, when present, is always an element of `playlist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    playlist: Vec<PathBuf>,
    current_file: Option<PathBuf>,
}

impl PlaybackSnapshot {
    /// Build a snapshot; a `current_file` missing from `playlist` is dropped
    pub fn new(playlist: Vec<PathBuf>, current_file: Option<PathBuf>) -> Self {
        let current_file = current_file.filter(|f| playlist.contains(f));
        Self {
            playlist,
            current_file,
        }
    }

    pub fn playlist(&self) -> &[PathBuf] {
        &self.playlist
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    /// Playlist rotated so playback resumes at `current_file`
    pub fn resume_order(&self) -> Vec<PathBuf> {
        let start = self
            .current_file
            .as_ref()
            .and_then(|current| self.playlist.iter().position(|f| f == current))
            .unwrap_or(0);

        let mut order = self.playlist.clone();
        order.rotate_left(start);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_resume_starts_at_current_file() {
        let snapshot = PlaybackSnapshot::new(paths(&["D", "E", "F", "G"]), Some(PathBuf::from("F")));
        assert_eq!(snapshot.resume_order(), paths(&["F", "G", "D", "E"]));
        assert_eq!(snapshot.current_file(), Some(Path::new("F")));
    }

    #[test]
    fn test_current_file_outside_playlist_is_dropped() {
        let snapshot = PlaybackSnapshot::new(paths(&["A", "B"]), Some(PathBuf::from("Z")));
        assert_eq!(snapshot.current_file(), None);
        assert_eq!(snapshot.resume_order(), paths(&["A", "B"]));
    }
}
