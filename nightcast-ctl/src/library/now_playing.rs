//! "Now playing" caption
//!
//! Kept in memory for chat replies and mirrored to a text file that the
//! stream overlay reads.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use nightcast_common::{EventBus, NightcastEvent};
use tracing::warn;

/// Caption shown before anything has played
pub const NOW_PLAYING_IDLE: &str = "等待播放...";

pub struct NowPlaying {
    text: RwLock<String>,
    file: Option<PathBuf>,
    events: EventBus,
}

impl NowPlaying {
    pub fn new(file: Option<PathBuf>, events: EventBus) -> Self {
        Self {
            text: RwLock::new(NOW_PLAYING_IDLE.to_string()),
            file,
            events,
        }
    }

    pub fn get(&self) -> String {
        self.text.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the caption and rewrite the caption file
    ///
    /// A failed file write is logged; the in-memory caption is updated anyway.
    pub async fn set(&self, title: &str) {
        *self.text.write().unwrap_or_else(PoisonError::into_inner) = title.to_string();

        if let Some(file) = &self.file {
            if let Err(e) = tokio::fs::write(file, title.as_bytes()).await {
                warn!("Failed to write {}: {}", file.display(), e);
            }
        }

        self.events.emit_lossy(NightcastEvent::NowPlayingChanged {
            title: title.to_string(),
            timestamp: Utc::now(),
        });
    }
}
