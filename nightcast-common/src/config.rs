//! Configuration file resolution
//!
//! The daemon reads one TOML bootstrap file. Resolution order:
//! 1. Explicit path (command-line argument or environment variable)
//! 2. `nightcast.toml` in the working directory
//! 3. `<user config dir>/nightcast/config.toml`
//! 4. `/etc/nightcast/config.toml` (Linux only)

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "nightcast.toml";

/// Candidate paths in priority order, excluding an explicit path
pub fn candidate_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];

    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("nightcast").join("config.toml"));
    }

    if cfg!(target_os = "linux") {
        paths.push(PathBuf::from("/etc/nightcast/config.toml"));
    }

    paths
}

/// Resolve the configuration file path
///
/// An explicit path must exist; otherwise the first existing candidate wins.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let candidates = candidate_config_paths();
    for path in &candidates {
        debug!("Looking for config file at {}", path.display());
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    Err(Error::Config(format!(
        "No config file found (searched: {})",
        searched.join(", ")
    )))
}

/// Read and deserialize a TOML file
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}
