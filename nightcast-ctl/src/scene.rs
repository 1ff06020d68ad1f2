//! Scene visibility observer
//!
//! Shows the media source while something is being played for viewers and
//! the broadcast source while the streamer is on camera:
//!
//! | mode                       | media source | broadcast source |
//! |----------------------------|--------------|------------------|
//! | playback, song_request     | shown        | hidden           |
//! | broadcast, pk              | hidden       | shown            |
//! | other                      | hidden       | hidden           |
//!
//! A mode that could not be applied (backend offline, or a source update
//! failed) is remembered and re-applied by [`SceneVisibility::reconcile`].

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use nightcast_common::Mode;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capability::CapabilityAdapter;
use crate::mode::ModeObserver;

/// `(media_visible, broadcast_visible)` for a mode
pub fn visibility_for(mode: Mode) -> (bool, bool) {
    match mode {
        Mode::Playback | Mode::SongRequest => (true, false),
        Mode::Broadcast | Mode::Pk => (false, true),
        Mode::Other => (false, false),
    }
}

/// Mode observer toggling the two scene sources
pub struct SceneVisibility {
    capability: Arc<dyn CapabilityAdapter>,
    media_source: String,
    broadcast_source: String,
    /// Mode whose visibility has not reached the backend yet; held across
    /// every apply so a reconcile never overwrites a newer mode
    pending: Mutex<Option<Mode>>,
}

impl SceneVisibility {
    pub fn new(
        capability: Arc<dyn CapabilityAdapter>,
        media_source: impl Into<String>,
        broadcast_source: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            media_source: media_source.into(),
            broadcast_source: broadcast_source.into(),
            pending: Mutex::new(None),
        }
    }

    /// Mode still waiting to be applied, if any
    pub async fn pending(&self) -> Option<Mode> {
        *self.pending.lock().await
    }

    /// Re-apply a mode that was skipped or failed earlier
    ///
    /// Returns `true` when a pending mode was applied successfully.
    pub async fn reconcile(&self) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(mode) = *pending else {
            return false;
        };
        if !self.capability.check_connection().await {
            debug!("Backend still unavailable; keeping scene for {}", mode.key());
            return false;
        }

        info!("Re-applying scene visibility for {}", mode.key());
        if self.apply(mode).await.is_empty() {
            *pending = None;
            true
        } else {
            false
        }
    }

    /// Apply the visibility table for `mode`; returns the sources that failed
    pub async fn apply(&self, mode: Mode) -> Vec<String> {
        let (media, broadcast) = visibility_for(mode);
        let mut failed = Vec::new();

        for (source, visible) in [
            (self.media_source.as_str(), media),
            (self.broadcast_source.as_str(), broadcast),
        ] {
            if let Err(e) = self.capability.set_source_visible(source, visible).await {
                warn!("Failed to set '{}' visible={}: {}", source, visible, e);
                failed.push(source.to_string());
            }
        }
        failed
    }
}

#[async_trait]
impl ModeObserver for SceneVisibility {
    fn name(&self) -> &str {
        "scene-visibility"
    }

    async fn on_mode_change(&self, _old: Mode, new: Mode, _reason: &str) -> anyhow::Result<()> {
        let mut pending = self.pending.lock().await;
        if !self.capability.is_connected() {
            debug!("Backend offline; deferring scene update for {}", new.key());
            *pending = Some(new);
            return Ok(());
        }

        let failed = self.apply(new).await;
        if failed.is_empty() {
            *pending = None;
            Ok(())
        } else {
            *pending = Some(new);
            Err(anyhow!("visibility update failed for {}", failed.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_table() {
        assert_eq!(visibility_for(Mode::Playback), (true, false));
        assert_eq!(visibility_for(Mode::SongRequest), (true, false));
        assert_eq!(visibility_for(Mode::Broadcast), (false, true));
        assert_eq!(visibility_for(Mode::Pk), (false, true));
        assert_eq!(visibility_for(Mode::Other), (false, false));
    }
}
