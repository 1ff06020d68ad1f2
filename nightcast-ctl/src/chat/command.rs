//! Chat command grammar

use std::time::Duration;

use nightcast_common::Mode;

/// Parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `点歌 <keyword>`
    RequestSong(String),
    /// `切歌`
    Next,
    /// `当前`
    NowPlaying,
    /// `歌单`
    SongList,
    /// `回放 <code>`; bare `回放` (owner only) starts the replay rotation
    Replay(Option<String>),
    /// `帮助`, `命令` or `help`
    Help,
    /// `查看模式`
    ModeQuery,
    /// A mode's exact label, e.g. `直播模式`
    SwitchMode(Mode),
}

/// Cooldown bucket; one per command family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    RequestSong,
    Next,
    NowPlaying,
    SongList,
    Replay,
    Help,
    ModeQuery,
    SwitchMode,
}

impl CommandKind {
    pub fn cooldown(self) -> Duration {
        Duration::from_secs(match self {
            CommandKind::RequestSong => 5,
            CommandKind::Next => 10,
            CommandKind::NowPlaying => 10,
            CommandKind::SongList => 45,
            CommandKind::Replay => 5,
            CommandKind::Help => 5,
            CommandKind::ModeQuery => 2,
            CommandKind::SwitchMode => 3,
        })
    }
}

/// `prefix` followed by whitespace and a non-empty argument
fn argument<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let arg = rest.trim();
    (!arg.is_empty()).then_some(arg)
}

impl Command {
    /// Parse a chat line; anything unrecognised is `None`
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();

        if let Some(keyword) = argument(text, "点歌") {
            return Some(Command::RequestSong(keyword.to_string()));
        }
        if let Some(code) = argument(text, "回放") {
            return Some(Command::Replay(Some(code.to_string())));
        }

        match text {
            "切歌" => Some(Command::Next),
            "当前" => Some(Command::NowPlaying),
            "歌单" => Some(Command::SongList),
            "回放" => Some(Command::Replay(None)),
            "帮助" | "命令" | "help" => Some(Command::Help),
            "查看模式" => Some(Command::ModeQuery),
            other => Mode::from_label(other).map(Command::SwitchMode),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::RequestSong(_) => CommandKind::RequestSong,
            Command::Next => CommandKind::Next,
            Command::NowPlaying => CommandKind::NowPlaying,
            Command::SongList => CommandKind::SongList,
            Command::Replay(_) => CommandKind::Replay,
            Command::Help => CommandKind::Help,
            Command::ModeQuery => CommandKind::ModeQuery,
            Command::SwitchMode(_) => CommandKind::SwitchMode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_song_request() {
        assert_eq!(
            Command::parse("点歌 晴天"),
            Some(Command::RequestSong("晴天".into()))
        );
        assert_eq!(
            Command::parse("  点歌   Hello World  "),
            Some(Command::RequestSong("Hello World".into()))
        );
        // keyword is required and must be separated by whitespace
        assert_eq!(Command::parse("点歌"), None);
        assert_eq!(Command::parse("点歌晴天"), None);
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("切歌"), Some(Command::Next));
        assert_eq!(Command::parse("当前"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("歌单"), Some(Command::SongList));
        assert_eq!(Command::parse("help"), Some(Command::Help));
        assert_eq!(Command::parse("命令"), Some(Command::Help));
        assert_eq!(Command::parse("查看模式"), Some(Command::ModeQuery));
        assert_eq!(Command::parse("切歌吧"), None);
    }

    #[test]
    fn test_parse_replay() {
        assert_eq!(
            Command::parse("回放 2026013101"),
            Some(Command::Replay(Some("2026013101".into())))
        );
        assert_eq!(Command::parse("回放"), Some(Command::Replay(None)));
    }

    #[test]
    fn test_parse_mode_labels() {
        assert_eq!(Command::parse("直播模式"), Some(Command::SwitchMode(Mode::Broadcast)));
        assert_eq!(Command::parse("点歌模式"), Some(Command::SwitchMode(Mode::SongRequest)));
        assert_eq!(Command::parse("直播"), None);
    }

    #[test]
    fn test_cooldowns() {
        assert_eq!(CommandKind::RequestSong.cooldown(), Duration::from_secs(5));
        assert_eq!(CommandKind::SongList.cooldown(), Duration::from_secs(45));
        assert_eq!(CommandKind::ModeQuery.cooldown(), Duration::from_secs(2));
    }
}
