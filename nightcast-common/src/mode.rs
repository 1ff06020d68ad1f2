//! Broadcast modes
//!
//! The set of modes is closed and small. Each mode carries a stable key (used
//! for configuration and capability visibility tables), a display label (the
//! exact chat command that selects it) and a priority where a lower number is
//! harder to interrupt.
//!
//! Per-mode attributes live in [`ModeState`], one struct per mode, and are
//! only ever merged through a matching [`ModeStatePatch`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Mutually exclusive operating mode of the livestream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Live show in progress
    Broadcast,
    /// Competitive cross-room battle
    Pk,
    /// Default unattended looping rotation
    Playback,
    /// A listener-requested track is queued or playing
    SongRequest,
    /// Idle / uncategorized
    Other,
}

/// Read-only metadata attached to a mode
#[derive(Debug)]
struct ModeMeta {
    key: &'static str,
    label: &'static str,
    priority: u8,
}

/// Indexed by `Mode as usize`; order must match the enum declaration.
const MODE_TABLE: [ModeMeta; 5] = [
    ModeMeta { key: "broadcast", label: "直播模式", priority: 1 },
    ModeMeta { key: "pk", label: "PK模式", priority: 2 },
    ModeMeta { key: "playback", label: "轮播模式", priority: 2 },
    ModeMeta { key: "song_request", label: "点歌模式", priority: 2 },
    ModeMeta { key: "other", label: "其他模式", priority: 3 },
];

impl Mode {
    /// All modes in declaration order
    pub const ALL: [Mode; 5] = [
        Mode::Broadcast,
        Mode::Pk,
        Mode::Playback,
        Mode::SongRequest,
        Mode::Other,
    ];

    fn meta(self) -> &'static ModeMeta {
        &MODE_TABLE[self as usize]
    }

    /// Stable key, e.g. `"song_request"`
    pub fn key(self) -> &'static str {
        self.meta().key
    }

    /// Display label, also the chat command selecting this mode
    pub fn label(self) -> &'static str {
        self.meta().label
    }

    /// Priority rank (lower = more urgent)
    pub fn priority(self) -> u8 {
        self.meta().priority
    }

    /// Look up a mode by its stable key
    pub fn from_key(key: &str) -> Option<Mode> {
        Mode::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Look up a mode by its exact display label (surrounding whitespace ignored)
    pub fn from_label(command: &str) -> Option<Mode> {
        let command = command.trim();
        Mode::ALL.into_iter().find(|m| m.label() == command)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Mode::from_key(s.trim())
            .or_else(|| Mode::from_label(s))
            .ok_or_else(|| Error::InvalidInput(format!("unknown mode: {}", s)))
    }
}

// ========================================
// Per-mode state
// ========================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastState {
    pub is_active: bool,
    pub viewer_count: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PkState {
    pub is_active: bool,
    pub opponent_name: String,
    pub our_score: i64,
    pub opponent_score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackModeState {
    pub current_song: String,
    pub next_song: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongRequestState {
    pub queue_count: usize,
    pub requester: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherState {
    pub message: String,
}

impl Default for OtherState {
    fn default() -> Self {
        Self {
            message: "idle".to_string(),
        }
    }
}

/// Attribute bag owned by one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeState {
    Broadcast(BroadcastState),
    Pk(PkState),
    Playback(PlaybackModeState),
    SongRequest(SongRequestState),
    Other(OtherState),
}

impl ModeState {
    /// Initial state bag for a mode
    pub fn default_for(mode: Mode) -> Self {
        match mode {
            Mode::Broadcast => ModeState::Broadcast(BroadcastState::default()),
            Mode::Pk => ModeState::Pk(PkState::default()),
            Mode::Playback => ModeState::Playback(PlaybackModeState::default()),
            Mode::SongRequest => ModeState::SongRequest(SongRequestState::default()),
            Mode::Other => ModeState::Other(OtherState::default()),
        }
    }

    /// Mode this bag belongs to
    pub fn mode(&self) -> Mode {
        match self {
            ModeState::Broadcast(_) => Mode::Broadcast,
            ModeState::Pk(_) => Mode::Pk,
            ModeState::Playback(_) => Mode::Playback,
            ModeState::SongRequest(_) => Mode::SongRequest,
            ModeState::Other(_) => Mode::Other,
        }
    }

    /// Merge the keys present in `patch` into this bag.
    ///
    /// Returns `false` (and leaves the bag untouched) when the patch targets
    /// a different mode.
    pub fn apply(&mut self, patch: &ModeStatePatch) -> bool {
        match (self, patch) {
            (ModeState::Broadcast(s), ModeStatePatch::Broadcast(p)) => {
                merge(&mut s.is_active, &p.is_active);
                merge(&mut s.viewer_count, &p.viewer_count);
                merge(&mut s.uptime_seconds, &p.uptime_seconds);
                true
            }
            (ModeState::Pk(s), ModeStatePatch::Pk(p)) => {
                merge(&mut s.is_active, &p.is_active);
                merge(&mut s.opponent_name, &p.opponent_name);
                merge(&mut s.our_score, &p.our_score);
                merge(&mut s.opponent_score, &p.opponent_score);
                true
            }
            (ModeState::Playback(s), ModeStatePatch::Playback(p)) => {
                merge(&mut s.current_song, &p.current_song);
                merge(&mut s.next_song, &p.next_song);
                true
            }
            (ModeState::SongRequest(s), ModeStatePatch::SongRequest(p)) => {
                merge(&mut s.queue_count, &p.queue_count);
                merge(&mut s.requester, &p.requester);
                true
            }
            (ModeState::Other(s), ModeStatePatch::Other(p)) => {
                merge(&mut s.message, &p.message);
                true
            }
            _ => false,
        }
    }
}

fn merge<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPatch {
    pub is_active: Option<bool>,
    pub viewer_count: Option<u64>,
    pub uptime_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PkPatch {
    pub is_active: Option<bool>,
    pub opponent_name: Option<String>,
    pub our_score: Option<i64>,
    pub opponent_score: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPatch {
    pub current_song: Option<String>,
    pub next_song: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongRequestPatch {
    pub queue_count: Option<usize>,
    pub requester: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherPatch {
    pub message: Option<String>,
}

/// Partial update for one mode's state bag; absent keys are left as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeStatePatch {
    Broadcast(BroadcastPatch),
    Pk(PkPatch),
    Playback(PlaybackPatch),
    SongRequest(SongRequestPatch),
    Other(OtherPatch),
}

impl ModeStatePatch {
    /// Mode whose bag this patch targets
    pub fn mode(&self) -> Mode {
        match self {
            ModeStatePatch::Broadcast(_) => Mode::Broadcast,
            ModeStatePatch::Pk(_) => Mode::Pk,
            ModeStatePatch::Playback(_) => Mode::Playback,
            ModeStatePatch::SongRequest(_) => Mode::SongRequest,
            ModeStatePatch::Other(_) => Mode::Other,
        }
    }
}
