//! Media directory scanning

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Extensions the media source can play
pub const MEDIA_EXTENSIONS: [&str; 9] = [
    "mp3", "mp4", "mkv", "avi", "flv", "m4a", "aac", "ogg", "wav",
];

/// All playable files under `dir`, recursively, sorted by path
///
/// A missing or empty directory yields an empty list and a warning.
pub fn scan_media_dir(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        warn!("Media directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_ascii_lowercase();
                    MEDIA_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();

    files.sort();

    if files.is_empty() {
        warn!("No playable media in {}", dir.display());
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_recursive_sorted_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("2.mp4"), b"x").unwrap();
        fs::write(dir.path().join("a.MKV"), b"x").unwrap();
        fs::write(dir.path().join("c.txt"), b"x").unwrap();

        let files = scan_media_dir(dir.path());
        assert_eq!(files, vec![dir.path().join("a.MKV"), dir.path().join("b").join("2.mp4")]);
    }

    #[test]
    fn test_empty_and_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_media_dir(dir.path()).is_empty());
        assert!(scan_media_dir(&dir.path().join("missing")).is_empty());
    }
}
