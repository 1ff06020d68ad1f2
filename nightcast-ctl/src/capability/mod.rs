//! External media/scene capability
//!
//! The daemon never renders video itself. It drives a compositor (OBS over
//! WebSocket v5) or a bare player (VLC's HTTP interface) through the
//! [`CapabilityAdapter`] trait, which the playback adapter and the scene
//! visibility observer depend on.

pub mod obs;
pub mod vlc;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

pub use obs::ObsClient;
pub use vlc::VlcHttpClient;

/// Transport action on the media source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Play,
    Pause,
    Stop,
    /// Start the loaded playlist from its first entry
    Restart,
    Next,
    Previous,
}

impl MediaAction {
    /// OBS `TriggerMediaInputAction` constant
    pub fn obs_action(self) -> &'static str {
        match self {
            MediaAction::Play => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PLAY",
            MediaAction::Pause => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE",
            MediaAction::Stop => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_STOP",
            MediaAction::Restart => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART",
            MediaAction::Next => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_NEXT",
            MediaAction::Previous => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PREVIOUS",
        }
    }

    /// VLC `status.json?command=` value
    pub fn vlc_command(self) -> &'static str {
        match self {
            MediaAction::Play => "pl_forceresume",
            MediaAction::Pause => "pl_forcepause",
            MediaAction::Stop => "pl_stop",
            MediaAction::Restart => "pl_play",
            MediaAction::Next => "pl_next",
            MediaAction::Previous => "pl_previous",
        }
    }
}

/// Notification pushed by the backend about the media source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The media source began playing a playlist entry
    PlaybackStarted { source: String },
    /// The media source reached the end of what it was given
    PlaybackEnded { source: String },
}

/// Media and scene control surface
///
/// Every call may fail with
/// [`Error::CapabilityUnavailable`](crate::error::Error::CapabilityUnavailable)
/// while the backend is unreachable; callers log and carry on.
#[async_trait]
pub trait CapabilityAdapter: Send + Sync {
    /// Backend name for logs and events ("obs", "vlc")
    fn name(&self) -> &str;

    /// Whether the backend is believed reachable right now
    fn is_connected(&self) -> bool;

    /// Like [`is_connected`](Self::is_connected), but backends without a
    /// persistent connection may check first
    async fn check_connection(&self) -> bool {
        self.is_connected()
    }

    /// Replace the media source's playlist (does not start playback)
    async fn set_playlist(&self, files: &[PathBuf]) -> Result<()>;

    async fn trigger_media_action(&self, action: MediaAction) -> Result<()>;

    /// Show or hide a named source in the configured scene
    async fn set_source_visible(&self, source: &str, visible: bool) -> Result<()>;

    /// Stream of media notifications; backends without push events return
    /// a receiver that never yields
    fn subscribe_media_events(&self) -> broadcast::Receiver<MediaEvent>;
}
