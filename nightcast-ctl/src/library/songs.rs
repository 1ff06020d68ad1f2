//! Requestable song index

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};
use walkdir::WalkDir;

use super::{display_name, extension_lower};

/// Extensions indexed as songs
pub const SONG_EXTENSIONS: [&str; 5] = ["mp4", "mp3", "flv", "mkv", "wav"];

/// Flat index of `song_dir`, sorted by display name
pub struct SongLibrary {
    dir: PathBuf,
    index: RwLock<Vec<(String, PathBuf)>>,
}

impl SongLibrary {
    pub fn open(dir: &Path) -> Self {
        let library = Self {
            dir: dir.to_path_buf(),
            index: RwLock::new(Vec::new()),
        };
        library.rebuild();
        library
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-scan the song directory (top level only)
    pub fn rebuild(&self) {
        let mut index: Vec<(String, PathBuf)> = Vec::new();

        if !self.dir.is_dir() {
            warn!("Song directory does not exist: {}", self.dir.display());
        } else {
            for entry in WalkDir::new(&self.dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let is_song = extension_lower(entry.path())
                    .map(|ext| SONG_EXTENSIONS.contains(&ext.as_str()))
                    .unwrap_or(false);
                if is_song {
                    index.push((display_name(entry.path()), entry.into_path()));
                }
            }
        }

        index.sort_by(|a, b| a.0.cmp(&b.0));
        info!("Song index: {} file(s) in {}", index.len(), self.dir.display());
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    /// First song whose name contains `keyword`, ignoring case
    pub fn search(&self, keyword: &str) -> Option<(String, PathBuf)> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return None;
        }
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(name, _)| name.to_lowercase().contains(&keyword))
            .cloned()
    }

    /// Song names in index order; `limit == 0` means all
    pub fn list(&self, limit: usize) -> Vec<String> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let take = if limit == 0 { index.len() } else { limit };
        index.iter().take(take).map(|(name, _)| name.clone()).collect()
    }

    pub fn total(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
