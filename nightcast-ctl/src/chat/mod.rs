//! Chat command handling
//!
//! Listener messages arrive from whatever bridges the platform's chat into
//! the daemon (the HTTP API's `POST /api/chat`). Recognised commands are
//! rate-limited per command and answered through a paced reply queue.

mod command;
mod dispatcher;
mod replies;

use serde::Deserialize;

pub use command::{Command, CommandKind};
pub use dispatcher::{ChatDispatcher, DispatchOutcome};
pub use replies::{run_reply_sender, truncate_chars, EventReplySink, ReplyQueue, ReplySink};

/// One chat message
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    /// Sender's platform uid
    #[serde(default)]
    pub uid: u64,
    /// Sender's display name
    #[serde(default)]
    pub uname: String,
    pub text: String,
}
