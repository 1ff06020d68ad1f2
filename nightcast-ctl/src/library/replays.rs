//! Recorded show index
//!
//! Replay files are named by date and show number, `YYYYMMDDNN.ext`
//! (e.g. `2026013101.mp4`), and are requested by that 10-digit code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};
use walkdir::WalkDir;

pub const REPLAY_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "flv"];

/// The replay code of a file name, when it follows the naming scheme
pub fn parse_replay_code(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if stem.len() == 10
        && stem.bytes().all(|b| b.is_ascii_digit())
        && REPLAY_EXTENSIONS.contains(&ext.as_str())
    {
        Some(stem.to_string())
    } else {
        None
    }
}

/// Index of `replay_dir` keyed by replay code
pub struct ReplayLibrary {
    dir: Option<PathBuf>,
    index: RwLock<BTreeMap<String, PathBuf>>,
}

impl ReplayLibrary {
    pub fn open(dir: Option<&Path>) -> Self {
        let library = Self {
            dir: dir.map(Path::to_path_buf),
            index: RwLock::new(BTreeMap::new()),
        };
        library.rebuild();
        library
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn rebuild(&self) {
        let mut index = BTreeMap::new();

        match &self.dir {
            Some(dir) if dir.is_dir() => {
                for entry in WalkDir::new(dir)
                    .min_depth(1)
                    .max_depth(1)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    let code = entry.file_name().to_str().and_then(parse_replay_code);
                    if let Some(code) = code {
                        index.insert(code, entry.into_path());
                    }
                }
                info!("Replay index: {} file(s) in {}", index.len(), dir.display());
            }
            Some(dir) => warn!("Replay directory does not exist: {}", dir.display()),
            None => {}
        }

        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    /// Exact lookup by 10-digit code
    pub fn search(&self, code: &str) -> Option<(String, PathBuf)> {
        let code = code.trim();
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .map(|path| (code.to_string(), path.clone()))
    }

    /// All replay files ordered by code
    pub fn all_files(&self) -> Vec<PathBuf> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn total(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_replay_code() {
        assert_eq!(parse_replay_code("2026013101.mp4"), Some("2026013101".into()));
        assert_eq!(parse_replay_code("2026013101.MKV"), Some("2026013101".into()));
        assert_eq!(parse_replay_code("202601310.mp4"), None);
        assert_eq!(parse_replay_code("2026013101.mp3"), None);
        assert_eq!(parse_replay_code("show-2026013101.mp4"), None);
        assert_eq!(parse_replay_code("2026013101"), None);
    }

    #[test]
    fn test_index_and_search() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["2026020102.mkv", "2026013101.mp4", "random.mp4"] {
            fs::write(dir.path().join(f), b"x").unwrap();
        }
        let library = ReplayLibrary::open(Some(dir.path()));

        assert_eq!(library.total(), 2);
        let (code, path) = library.search(" 2026013101 ").unwrap();
        assert_eq!(code, "2026013101");
        assert!(path.ends_with("2026013101.mp4"));
        assert!(library.search("2026013199").is_none());

        let files = library.all_files();
        assert!(files[0].ends_with("2026013101.mp4"));
        assert!(files[1].ends_with("2026020102.mkv"));
    }

    #[test]
    fn test_unconfigured_directory() {
        let library = ReplayLibrary::open(None);
        assert_eq!(library.total(), 0);
        assert!(library.dir().is_none());
    }
}
