//! Chat command dispatcher
//!
//! Turns one [`ChatMessage`] into calls on the mode coordinator, the
//! playback adapter and the library, then queues a short reply. Every reply
//! starts with `>_ ` so the overlay can tell bot lines from listeners.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use nightcast_common::mode::SongRequestPatch;
use nightcast_common::{Mode, ModeStatePatch, QueueKind};
use tracing::{info, warn};

use super::{ChatMessage, Command, CommandKind, ReplyQueue};
use crate::library::Library;
use crate::mode::ModeCoordinator;
use crate::playback::{MediaPlaybackAdapter, NextOutcome, PlaybackKey};

/// Songs named in the `歌单` reply
const SONG_LIST_PREVIEW: usize = 5;

const HELP_TEXT: &str = ">_ 点歌[歌名] 切歌 当前 歌单 回放[编号] 查看模式";

/// What happened to one chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command
    Ignored,
    /// Command recognised but its cooldown has not elapsed
    CoolingDown(CommandKind),
    Handled(CommandKind),
}

pub struct ChatDispatcher {
    coordinator: Arc<ModeCoordinator>,
    adapter: Arc<MediaPlaybackAdapter>,
    library: Arc<Library>,
    replies: ReplyQueue,
    owner_uid: u64,
    last_used: Mutex<HashMap<CommandKind, Instant>>,
}

impl ChatDispatcher {
    pub fn new(
        coordinator: Arc<ModeCoordinator>,
        adapter: Arc<MediaPlaybackAdapter>,
        library: Arc<Library>,
        replies: ReplyQueue,
        owner_uid: u64,
    ) -> Self {
        Self {
            coordinator,
            adapter,
            library,
            replies,
            owner_uid,
            last_used: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one chat message
    pub async fn handle(&self, message: &ChatMessage) -> DispatchOutcome {
        let Some(command) = Command::parse(&message.text) else {
            return DispatchOutcome::Ignored;
        };
        let kind = command.kind();
        if !self.try_acquire(kind, Instant::now()) {
            return DispatchOutcome::CoolingDown(kind);
        }

        match command {
            Command::RequestSong(keyword) => self.request_song(message, &keyword).await,
            Command::Next => self.next().await,
            Command::NowPlaying => {
                self.reply(format!(">_ 当前：{}", self.adapter.now_playing()));
            }
            Command::SongList => {
                let preview = self.library.songs.list(SONG_LIST_PREVIEW).join("、");
                self.reply(format!(
                    ">_ 共{}首：{}...",
                    self.library.songs.total(),
                    preview
                ));
            }
            Command::Replay(Some(code)) => self.request_replay(message, &code).await,
            Command::Replay(None) => self.start_replay_rotation(message).await,
            Command::Help => self.reply(HELP_TEXT),
            Command::ModeQuery => {
                let info = self.coordinator.get_mode_info().await;
                self.reply(format!(">_ 当前: {}", info.label));
            }
            Command::SwitchMode(mode) => self.switch_mode(message, mode).await,
        }
        DispatchOutcome::Handled(kind)
    }

    /// Record a use of `kind` unless it is still cooling down
    fn try_acquire(&self, kind: CommandKind, now: Instant) -> bool {
        let mut last_used = self
            .last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = last_used.get(&kind) {
            if now.saturating_duration_since(*last) < kind.cooldown() {
                return false;
            }
        }
        last_used.insert(kind, now);
        true
    }

    fn reply(&self, text: impl AsRef<str>) {
        self.replies.push(text);
    }

    // ========================================
    // Commands
    // ========================================

    async fn request_song(&self, message: &ChatMessage, keyword: &str) {
        let Some((name, path)) = self.library.songs.search(keyword) else {
            info!("[song] {}: '{}' not found", message.uname, keyword);
            self.reply(format!(">_ 未找到「{}」", keyword));
            return;
        };

        let mode = self.coordinator.current_mode().await;
        let busy = mode == Mode::SongRequest && self.adapter.has_song_request().await;
        if matches!(mode, Mode::Broadcast | Mode::Pk) || busy {
            self.enqueue_song(message, name, path).await;
            return;
        }

        let reason = format!("song request from {}", message.uname);
        if !self.coordinator.set_mode(Mode::SongRequest, &reason).await {
            self.enqueue_song(message, name, path).await;
            return;
        }

        if self.adapter.play(&path).await {
            info!("[song] {}: '{}' -> {} (playing)", message.uname, keyword, name);
            self.coordinator
                .update_mode_state(ModeStatePatch::SongRequest(SongRequestPatch {
                    requester: Some(message.uname.clone()),
                    ..Default::default()
                }))
                .await;
            self.reply(format!(">_ 正在播放：{}", name));
        } else {
            warn!("[song] failed to play {}", path.display());
            self.reply(">_ 播放失败，请重试");
        }
    }

    async fn enqueue_song(&self, message: &ChatMessage, name: String, path: PathBuf) {
        let position = self.library.song_queue.add(path, name.clone());
        info!("[song] {} queued {} (position {})", message.uname, name, position);
        self.coordinator
            .update_mode_state(ModeStatePatch::SongRequest(SongRequestPatch {
                queue_count: Some(self.library.song_queue.len()),
                requester: Some(message.uname.clone()),
            }))
            .await;
        self.reply(format!(">_ 已添加到队列：{}", name));
    }

    async fn next(&self) {
        let ok = match self.adapter.next_song().await {
            NextOutcome::Playing(_) | NextOutcome::Skipped => true,
            NextOutcome::Drained(QueueKind::Song) => {
                self.coordinator.auto_switch_for_song_request(0).await;
                true
            }
            NextOutcome::Drained(QueueKind::Replay) => true,
            NextOutcome::Failed => false,
        };
        self.reply(if ok { ">_ 已切歌~" } else { ">_ 切歌失败" });
    }

    async fn request_replay(&self, message: &ChatMessage, code: &str) {
        let Some((code, path)) = self.library.replays.search(code) else {
            self.reply(format!(">_ 未找到回放「{}」", code));
            return;
        };

        let idle = self.coordinator.current_mode().await == Mode::Playback
            && !self.adapter.has_override().await;
        if idle {
            if self.adapter.play_replay(&path).await {
                info!("[replay] {}: {} (playing)", message.uname, code);
                self.reply(format!(">_ 正在回放：{}", code));
            } else {
                self.reply(">_ 播放失败，请重试");
            }
            return;
        }

        let position = self.library.replay_queue.add(path, code.clone());
        info!("[replay] {} queued {} (position {})", message.uname, code, position);
        self.reply(format!(">_ 回放已排队：{}", code));
    }

    async fn start_replay_rotation(&self, message: &ChatMessage) {
        if message.uid != self.owner_uid {
            self.reply(">_ 回放轮播仅限主播");
            return;
        }
        if self.coordinator.current_mode().await != Mode::Playback {
            self.reply(">_ 仅轮播模式可回放");
            return;
        }
        if self.library.replays.total() == 0 {
            self.reply(">_ 暂无回放");
            return;
        }
        self.adapter.resync(PlaybackKey::Replay).await;
        self.reply(format!(">_ 回放轮播：共{}场", self.library.replays.total()));
    }

    async fn switch_mode(&self, message: &ChatMessage, mode: Mode) {
        let reason = format!("chat ({})", message.uname);
        if self.coordinator.current_mode().await == mode {
            self.adapter.resync(PlaybackKey::from_mode(mode)).await;
            self.reply(format!(">_ 已切换: {}", mode.label()));
            return;
        }

        if self.coordinator.set_mode(mode, &reason).await {
            info!("[mode] {} -> {}", message.uname, mode.label());
            self.reply(format!(">_ 已切换: {}", mode.label()));
        } else {
            let current = self.coordinator.current_mode().await;
            warn!("[mode] {} blocked from {} to {}", message.uname, current, mode);
            self.reply(format!(">_ 无法切换 (当前{})", current.label()));
        }
    }
}
