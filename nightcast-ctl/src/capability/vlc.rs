//! VLC HTTP interface backend
//!
//! Drives a standalone VLC through its legacy `/requests/status.json`
//! endpoint. VLC has no scenes, so visibility requests are accepted and
//! ignored. It pushes no events either:
//! [`run_status_poller`](VlcHttpClient::run_status_poller) reads the status
//! on an interval and turns item changes and the end of playback into
//! [`MediaEvent`]s.
//!
//! VLC authenticates with HTTP basic auth, an empty user name and the
//! configured password.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use nightcast_common::{EventBus, NightcastEvent};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CapabilityAdapter, MediaAction, MediaEvent};
use crate::config::VlcConfig;
use crate::error::{Error, Result};

/// Source name VLC media events carry
pub const VLC_SOURCE: &str = "vlc";

/// Fields of `status.json` the poller reads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VlcStatus {
    /// "playing", "paused" or "stopped"
    pub state: String,
    /// Playlist id of the current item; -1 when there is none
    #[serde(default)]
    pub currentplid: i64,
}

impl VlcStatus {
    fn is_playing(&self) -> bool {
        self.state == "playing"
    }
}

/// Turns consecutive status reads into media events
#[derive(Debug, Default)]
struct StatusTracker {
    last: Option<VlcStatus>,
}

impl StatusTracker {
    /// `own_command` suppresses a stop caused by a command we just sent
    fn observe(&mut self, status: VlcStatus, own_command: bool) -> Option<MediaEvent> {
        let previous = self.last.replace(status.clone())?;
        let source = VLC_SOURCE.to_string();

        if status.is_playing() && status.currentplid != previous.currentplid {
            return Some(MediaEvent::PlaybackStarted { source });
        }
        if status.state == "stopped" && previous.is_playing() && !own_command {
            return Some(MediaEvent::PlaybackEnded { source });
        }
        None
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// VLC HTTP client
pub struct VlcHttpClient {
    client: Client,
    status_url: String,
    password: String,
    poll_interval: Duration,
    connected: AtomicBool,
    last_command: Mutex<Option<Instant>>,
    media_events: broadcast::Sender<MediaEvent>,
    events: EventBus,
}

impl VlcHttpClient {
    pub fn new(config: &VlcConfig, events: EventBus) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build VLC HTTP client: {}", e)))?;
        let (media_events, _) = broadcast::channel(16);

        Ok(Self {
            client,
            status_url: format!("http://{}:{}/requests/status.json", config.host, config.port),
            password: config.password.clone(),
            poll_interval: Duration::from_millis(config.status_poll_ms),
            connected: AtomicBool::new(false),
            last_command: Mutex::new(None),
            media_events,
            events,
        })
    }

    /// Issue a bare status request to learn whether VLC is reachable
    pub async fn is_reachable(&self) -> bool {
        self.command(&[]).await.is_ok()
    }

    /// Current player state
    pub async fn status(&self) -> Result<VlcStatus> {
        self.send(&[])
            .await?
            .json::<VlcStatus>()
            .await
            .map_err(|e| Error::Capability(format!("Unreadable VLC status: {}", e)))
    }

    /// Poll `status.json` until `cancel` fires, publishing media events
    pub async fn run_status_poller(self: Arc<Self>, cancel: CancellationToken) {
        info!("VLC status poller started (every {:?})", self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tracker = StatusTracker::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.status().await {
                Ok(status) => {
                    if let Some(event) = tracker.observe(status, self.commanded_recently()) {
                        debug!("VLC media event: {:?}", event);
                        let _ = self.media_events.send(event);
                    }
                }
                Err(e) => {
                    debug!("VLC status poll failed: {}", e);
                    tracker.reset();
                }
            }
        }
        debug!("VLC status poller stopped");
    }

    fn commanded_recently(&self) -> bool {
        let last = *self.last_command.lock().unwrap_or_else(PoisonError::into_inner);
        // The next poll after a command lands within two intervals
        last.is_some_and(|at| at.elapsed() < self.poll_interval * 2)
    }

    async fn command(&self, params: &[(&str, &str)]) -> Result<()> {
        if !params.is_empty() {
            *self.last_command.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        }
        self.send(params).await.map(|_| ())
    }

    async fn send(&self, params: &[(&str, &str)]) -> Result<Response> {
        let result = self
            .client
            .get(&self.status_url)
            .basic_auth("", Some(&self.password))
            .query(params)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.set_connected(false);
                return Err(Error::CapabilityUnavailable(format!("VLC request failed: {}", e)));
            }
        };

        self.set_connected(true);
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Capability(format!(
                "VLC answered {} for {:?}",
                status, params
            )));
        }
        Ok(response)
    }

    fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            self.events.emit_lossy(NightcastEvent::CapabilityConnectionChanged {
                backend: "vlc".to_string(),
                connected,
                timestamp: Utc::now(),
            });
        }
    }
}

/// `file://` URI for VLC's `in_enqueue`; relative paths are passed as-is
fn media_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

#[async_trait]
impl CapabilityAdapter for VlcHttpClient {
    fn name(&self) -> &str {
        "vlc"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn check_connection(&self) -> bool {
        self.is_reachable().await
    }

    async fn set_playlist(&self, files: &[PathBuf]) -> Result<()> {
        self.command(&[("command", "pl_empty")]).await?;
        for file in files {
            let uri = media_uri(file);
            self.command(&[("command", "in_enqueue"), ("input", uri.as_str())])
                .await?;
        }
        debug!("VLC playlist set ({} entries)", files.len());
        Ok(())
    }

    async fn trigger_media_action(&self, action: MediaAction) -> Result<()> {
        self.command(&[("command", action.vlc_command())]).await
    }

    async fn set_source_visible(&self, source: &str, visible: bool) -> Result<()> {
        debug!(
            "VLC has no scene sources; ignoring visibility of '{}' ({})",
            source, visible
        );
        Ok(())
    }

    fn subscribe_media_events(&self) -> broadcast::Receiver<MediaEvent> {
        self.media_events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_uri() {
        #[cfg(unix)]
        assert_eq!(media_uri(Path::new("/srv/a b.mp4")), "file:///srv/a%20b.mp4");
        assert_eq!(media_uri(Path::new("relative.mp4")), "relative.mp4");
    }

    #[tokio::test]
    async fn test_unreachable_vlc_reports_unavailable() {
        let config = VlcConfig {
            host: "127.0.0.1".into(),
            // Reserved port; nothing listens here
            port: 9,
            password: String::new(),
            request_timeout_secs: 1,
            ..VlcConfig::default()
        };
        let client = VlcHttpClient::new(&config, EventBus::new(4)).unwrap();

        let err = client
            .trigger_media_action(MediaAction::Stop)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(!client.is_connected());
        assert!(!client.is_reachable().await);
    }

    fn status(state: &str, plid: i64) -> VlcStatus {
        VlcStatus {
            state: state.to_string(),
            currentplid: plid,
        }
    }

    fn started() -> Option<MediaEvent> {
        Some(MediaEvent::PlaybackStarted {
            source: VLC_SOURCE.to_string(),
        })
    }

    fn ended() -> Option<MediaEvent> {
        Some(MediaEvent::PlaybackEnded {
            source: VLC_SOURCE.to_string(),
        })
    }

    #[test]
    fn test_tracker_reports_item_changes_and_end() {
        let mut tracker = StatusTracker::default();

        // First read is only a baseline
        assert_eq!(tracker.observe(status("playing", 4), false), None);
        assert_eq!(tracker.observe(status("playing", 4), false), None);
        assert_eq!(tracker.observe(status("playing", 5), false), started());
        assert_eq!(tracker.observe(status("paused", 5), false), None);
        assert_eq!(tracker.observe(status("playing", 5), false), None);
        assert_eq!(tracker.observe(status("stopped", -1), false), ended());
        assert_eq!(tracker.observe(status("stopped", -1), false), None);
    }

    #[test]
    fn test_tracker_ignores_stop_after_own_command() {
        let mut tracker = StatusTracker::default();
        tracker.observe(status("playing", 4), false);

        assert_eq!(tracker.observe(status("stopped", -1), true), None);
        assert_eq!(tracker.observe(status("playing", 9), false), started());

        tracker.reset();
        assert_eq!(tracker.observe(status("stopped", -1), false), None);
    }

    #[test]
    fn test_status_parses_vlc_json() {
        let parsed: VlcStatus = serde_json::from_str(
            r#"{"fullscreen": false, "state": "playing", "currentplid": 12, "volume": 256}"#,
        )
        .unwrap();
        assert_eq!(parsed, status("playing", 12));

        let idle: VlcStatus = serde_json::from_str(r#"{"state": "stopped"}"#).unwrap();
        assert_eq!(idle.currentplid, 0);
    }

    #[tokio::test]
    async fn test_visibility_is_a_noop() {
        let client = VlcHttpClient::new(&VlcConfig::default(), EventBus::new(4)).unwrap();
        assert!(client.set_source_visible("camera", true).await.is_ok());
    }
}
