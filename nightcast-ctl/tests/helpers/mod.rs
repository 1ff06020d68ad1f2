//! Shared integration test infrastructure
//!
//! - [`RecordingAdapter`]: in-memory capability backend that records every
//!   call and can be switched offline
//! - [`MediaTree`]: temporary song/rotation/replay directories
//! - [`Harness`]: library + playback adapter + coordinator wired like `main`

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nightcast_common::{EventBus, Mode};
use nightcast_ctl::capability::{CapabilityAdapter, MediaAction, MediaEvent};
use nightcast_ctl::error::{Error, Result};
use nightcast_ctl::library::Library;
use nightcast_ctl::mode::{ModeCoordinator, TransitionPolicy};
use nightcast_ctl::playback::{MediaDirs, MediaPlaybackAdapter};
use nightcast_ctl::scene::SceneVisibility;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// One call made against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetPlaylist(Vec<PathBuf>),
    Action(MediaAction),
    Visible(String, bool),
}

/// Capability backend that remembers what it was asked to do
pub struct RecordingAdapter {
    calls: Mutex<Vec<Call>>,
    connected: AtomicBool,
    media_events: broadcast::Sender<MediaEvent>,
}

impl RecordingAdapter {
    pub fn new() -> Arc<Self> {
        let (media_events, _) = broadcast::channel(16);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            media_events,
        })
    }

    /// Offline backends fail every call with `CapabilityUnavailable`
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Most recent playlist pushed to the media source
    pub fn last_playlist(&self) -> Option<Vec<PathBuf>> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::SetPlaylist(files) => Some(files),
            _ => None,
        })
    }

    pub fn last_action(&self) -> Option<MediaAction> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::Action(action) => Some(action),
            _ => None,
        })
    }

    /// Push a `PlaybackStarted` for the media source
    pub fn start_playback(&self) {
        let _ = self.media_events.send(MediaEvent::PlaybackStarted {
            source: "vlc_player".to_string(),
        });
    }

    /// Push a `PlaybackEnded` for the media source
    pub fn end_playback(&self) {
        let _ = self.media_events.send(MediaEvent::PlaybackEnded {
            source: "vlc_player".to_string(),
        });
    }

    fn record(&self, call: Call) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::CapabilityUnavailable("test backend offline".into()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl CapabilityAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set_playlist(&self, files: &[PathBuf]) -> Result<()> {
        self.record(Call::SetPlaylist(files.to_vec()))
    }

    async fn trigger_media_action(&self, action: MediaAction) -> Result<()> {
        self.record(Call::Action(action))
    }

    async fn set_source_visible(&self, source: &str, visible: bool) -> Result<()> {
        self.record(Call::Visible(source.to_string(), visible))
    }

    fn subscribe_media_events(&self) -> broadcast::Receiver<MediaEvent> {
        self.media_events.subscribe()
    }
}

/// Temporary media directories
pub struct MediaTree {
    dir: TempDir,
}

impl MediaTree {
    /// Songs, a rotation directory with `A.mp4`..`F.mp4` and two replays
    pub fn new() -> Self {
        let tree = Self {
            dir: TempDir::new().unwrap(),
        };
        for name in ["晴天.mp3", "稻香.mp4", "夜曲.flv"] {
            tree.touch("songs", name);
        }
        for name in ["A.mp4", "B.mp4", "C.mp4", "D.mp4", "E.mp4", "F.mp4"] {
            tree.touch("rotation", name);
        }
        for name in ["2024010101.mp4", "2024010202.mkv"] {
            tree.touch("replays", name);
        }
        fs::create_dir_all(tree.path("data")).unwrap();
        tree
    }

    pub fn path(&self, sub: &str) -> PathBuf {
        self.dir.path().join(sub)
    }

    pub fn touch(&self, sub: &str, name: &str) -> PathBuf {
        let dir = self.path(sub);
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join(name);
        fs::write(&file, b"media").unwrap();
        file
    }

    pub fn song(&self, name: &str) -> PathBuf {
        self.path("songs").join(name)
    }

    pub fn rotation(&self, name: &str) -> PathBuf {
        self.path("rotation").join(name)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Everything `main` wires together, minus the network
pub struct Harness {
    pub tree: MediaTree,
    pub events: EventBus,
    pub capability: Arc<RecordingAdapter>,
    pub library: Arc<Library>,
    pub scene: Arc<SceneVisibility>,
    pub adapter: Arc<MediaPlaybackAdapter>,
    pub coordinator: Arc<ModeCoordinator>,
}

impl Harness {
    /// Coordinator idle in `Other` with scene + playback observers registered
    pub async fn new(policy: TransitionPolicy) -> Self {
        let tree = MediaTree::new();
        let events = EventBus::new(256);
        let capability = RecordingAdapter::new();
        let library = Arc::new(Library::open(
            &tree.path("songs"),
            Some(tree.path("replays").as_path()),
            Some(tree.path("data").join("now_playing.txt").as_path()),
            events.clone(),
        ));
        let adapter = Arc::new(MediaPlaybackAdapter::new(
            capability.clone(),
            library.clone(),
            MediaDirs {
                playback: tree.path("rotation"),
                replay: Some(tree.path("replays")),
            },
        ));
        let scene = Arc::new(SceneVisibility::new(
            capability.clone(),
            "vlc_player",
            "broadcast_screen",
        ));
        let coordinator = Arc::new(ModeCoordinator::new(policy, events.clone()));
        coordinator.register_observer(scene.clone()).await;
        coordinator.register_observer(adapter.clone()).await;

        Self {
            tree,
            events,
            capability,
            library,
            scene,
            adapter,
            coordinator,
        }
    }

    /// Harness already in playback mode with the rotation loaded
    pub async fn in_playback() -> Self {
        let harness = Self::new(TransitionPolicy::Priority).await;
        assert!(harness.coordinator.set_mode(Mode::Playback, "test").await);
        harness.capability.clear();
        harness
    }
}
