//! Paced chat replies
//!
//! Platforms throttle bot messages, so replies are queued and sent one at a
//! time no faster than the configured interval. Delivery is delegated to a
//! [`ReplySink`]; the default sink logs the reply and publishes it on the
//! event bus for the chat bridge to pick up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use nightcast_common::{EventBus, NightcastEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Attempts per reply before it is dropped
const MAX_SEND_ATTEMPTS: u32 = 3;

/// Delivers one reply to the chat platform
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

/// Logs replies and publishes them as `ChatReply` events
pub struct EventReplySink {
    events: EventBus,
}

impl EventReplySink {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

#[async_trait]
impl ReplySink for EventReplySink {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        info!("Chat reply: {}", text);
        self.events.emit_lossy(NightcastEvent::ChatReply {
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Producer side of the reply queue; cheap to clone
#[derive(Clone)]
pub struct ReplyQueue {
    tx: mpsc::UnboundedSender<String>,
    max_chars: usize,
}

impl ReplyQueue {
    /// Create a queue and the receiver to hand to [`run_reply_sender`]
    pub fn channel(max_chars: usize) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, max_chars }, rx)
    }

    /// Queue a reply, truncated to the platform's length limit
    pub fn push(&self, text: impl AsRef<str>) {
        let text = truncate_chars(text.as_ref(), self.max_chars);
        if self.tx.send(text).is_err() {
            debug!("Reply sender stopped; dropping reply");
        }
    }
}

/// Drain `rx` into `sink`, at most one reply per `interval`
///
/// A failed send is retried after twice the interval, up to
/// `MAX_SEND_ATTEMPTS` times.
pub async fn run_reply_sender(
    mut rx: mpsc::UnboundedReceiver<String>,
    sink: Arc<dyn ReplySink>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let limiter = Quota::with_period(interval).map(RateLimiter::direct);
    let mut backlog: VecDeque<(String, u32)> = VecDeque::new();

    loop {
        let (text, attempts) = match backlog.pop_front() {
            Some(entry) => entry,
            None => tokio::select! {
                _ = cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Some(text) => (text, 0),
                    None => break,
                },
            },
        };

        if let Some(limiter) = &limiter {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = limiter.until_ready() => {}
            }
        }

        if let Err(e) = sink.send(&text).await {
            let attempts = attempts + 1;
            if attempts >= MAX_SEND_ATTEMPTS {
                warn!("Dropping reply after {} failed attempts: {}", attempts, e);
                continue;
            }
            warn!("Reply send failed ({}); retrying", e);
            backlog.push_front((text, attempts));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval * 2) => {}
            }
        }
    }

    debug!("Reply sender stopped");
}
