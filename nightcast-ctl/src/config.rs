//! Daemon configuration
//!
//! Loaded once at startup from the TOML file located by
//! [`nightcast_common::config::resolve_config_path`]. Every section except
//! `[paths]` is optional and falls back to the defaults below.
//!
//! ```toml
//! [paths]
//! song_dir = "D:/songs"
//! playback_dir = "D:/rotation"
//! replay_dir = "D:/replays"
//! data_dir = "./data"
//!
//! [capability]
//! backend = "obs"
//!
//! [obs]
//! password = "secret"
//! ```

use std::path::{Path, PathBuf};

use nightcast_common::Mode;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mode::TransitionPolicy;

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub capability: CapabilityConfig,
    #[serde(default)]
    pub obs: ObsConfig,
    #[serde(default)]
    pub vlc: VlcConfig,
    #[serde(default)]
    pub mode: ModeConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate the configuration at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = nightcast_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.paths.song_dir.as_os_str().is_empty() {
            return Err(Error::Config("paths.song_dir must not be empty".into()));
        }
        if self.paths.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("paths.data_dir must not be empty".into()));
        }
        if self.watchdog.poll_interval_secs == 0 {
            return Err(Error::Config(
                "watchdog.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.chat.max_reply_chars == 0 {
            return Err(Error::Config("chat.max_reply_chars must be at least 1".into()));
        }
        if self.obs.request_timeout_secs == 0 || self.vlc.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be at least 1".into()));
        }
        if self.vlc.status_poll_ms == 0 {
            return Err(Error::Config("vlc.status_poll_ms must be at least 1".into()));
        }
        for (name, port) in [
            ("obs.port", self.obs.port),
            ("vlc.port", self.vlc.port),
            ("http.port", self.http.port),
        ] {
            if port == 0 {
                return Err(Error::Config(format!("{} must not be 0", name)));
            }
        }
        if matches!(self.mode.initial, Mode::Other) {
            return Err(Error::Config(
                "mode.initial must name an active mode (not \"other\")".into(),
            ));
        }
        Ok(())
    }
}

// ========================================
// [paths]
// ========================================

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Flat directory of requestable songs
    pub song_dir: PathBuf,
    /// Rotation directory for playback mode (defaults to `song_dir`)
    #[serde(default)]
    pub playback_dir: Option<PathBuf>,
    /// Directory of recorded replays named `YYYYMMDDNN.ext`
    #[serde(default)]
    pub replay_dir: Option<PathBuf>,
    /// Where `now_playing.txt` is written
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl PathsConfig {
    /// Rotation directory, falling back to the song directory
    pub fn playback_dir(&self) -> &Path {
        self.playback_dir.as_deref().unwrap_or(&self.song_dir)
    }

    /// Path of the caption file read by the overlay
    pub fn now_playing_file(&self) -> PathBuf {
        self.data_dir.join("now_playing.txt")
    }
}

// ========================================
// [capability], [obs], [vlc]
// ========================================

/// Which external media/scene controller to drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Obs,
    Vlc,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub backend: Backend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Scene holding both the media and the broadcast sources
    pub scene_name: String,
    /// VLC video source that plays rotation and requests
    pub media_source: String,
    /// Camera / capture source shown while live
    pub broadcast_source: String,
    pub reconnect_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4455,
            password: String::new(),
            scene_name: "AScreen".to_string(),
            media_source: "vlc_player".to_string(),
            broadcast_source: "broadcast_screen".to_string(),
            reconnect_interval_secs: 5,
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VlcConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub request_timeout_secs: u64,
    /// How often `status.json` is read to notice items starting and ending
    pub status_poll_ms: u64,
}

impl Default for VlcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            password: String::new(),
            request_timeout_secs: 5,
            status_poll_ms: 1000,
        }
    }
}

// ========================================
// [mode], [watchdog], [chat]
// ========================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub policy: TransitionPolicy,
    /// Mode entered right after startup
    pub initial: Mode,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            policy: TransitionPolicy::Priority,
            initial: Mode::Playback,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub poll_interval_secs: u64,
    /// A single requested song is abandoned after this long
    pub song_request_timeout_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            song_request_timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Streamer's uid; unlocks owner-only commands (0 = nobody)
    pub owner_uid: u64,
    pub reply_interval_ms: u64,
    pub max_reply_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            owner_uid: 0,
            reply_interval_ms: 1500,
            max_reply_chars: 30,
        }
    }
}

// ========================================
// [http], [logging]
// ========================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5750,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; `RUST_LOG` wins when set
    pub level: Option<String>,
    /// Optional log file (appended) in addition to stderr
    pub file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str("[paths]\nsong_dir = \"/srv/songs\"\n").unwrap();

        assert_eq!(config.capability.backend, Backend::Obs);
        assert_eq!(config.obs.port, 4455);
        assert_eq!(config.obs.scene_name, "AScreen");
        assert_eq!(config.obs.media_source, "vlc_player");
        assert_eq!(config.vlc.port, 8080);
        assert_eq!(config.vlc.status_poll_ms, 1000);
        assert_eq!(config.mode.policy, TransitionPolicy::Priority);
        assert_eq!(config.mode.initial, Mode::Playback);
        assert_eq!(config.watchdog.song_request_timeout_secs, 900);
        assert_eq!(config.chat.max_reply_chars, 30);
        assert_eq!(config.http.port, 5750);
        assert_eq!(config.paths.playback_dir(), Path::new("/srv/songs"));
        assert_eq!(
            config.paths.now_playing_file(),
            PathBuf::from("./data").join("now_playing.txt")
        );
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [paths]
            song_dir = "/srv/songs"
            playback_dir = "/srv/rotation"
            replay_dir = "/srv/replays"
            data_dir = "/var/lib/nightcast"

            [capability]
            backend = "vlc"

            [vlc]
            password = "pw"

            [mode]
            policy = "open"
            initial = "song_request"

            [chat]
            owner_uid = 12345
            "#,
        )
        .unwrap();

        assert_eq!(config.capability.backend, Backend::Vlc);
        assert_eq!(config.vlc.password, "pw");
        assert_eq!(config.mode.policy, TransitionPolicy::Open);
        assert_eq!(config.mode.initial, Mode::SongRequest);
        assert_eq!(config.chat.owner_uid, 12345);
        assert_eq!(config.paths.playback_dir(), Path::new("/srv/rotation"));
    }

    #[test]
    fn test_missing_paths_section_is_rejected() {
        let err = Config::from_toml_str("[http]\nport = 1\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = Config::from_toml_str(
            "[paths]\nsong_dir = \"/s\"\n[watchdog]\npoll_interval_secs = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_ports_are_rejected() {
        for section in ["obs", "vlc", "http"] {
            let toml = format!("[paths]\nsong_dir = \"/s\"\n[{}]\nport = 0\n", section);
            match Config::from_toml_str(&toml) {
                Err(Error::Config(msg)) => assert!(msg.contains(section), "{}", msg),
                other => panic!("{} port 0 accepted: {:?}", section, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_initial_mode_other_is_rejected() {
        let err = Config::from_toml_str("[paths]\nsong_dir = \"/s\"\n[mode]\ninitial = \"other\"\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let err = Config::from_toml_str("[paths]\nsong_dir = \"/s\"\n[capability]\nbackend = \"mpv\"\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
