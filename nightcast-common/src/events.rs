//! Event types for the nightcast event system
//!
//! Events describe what already happened (a mode was switched, a request was
//! queued, "now playing" changed). They are fanned out over a
//! [`EventBus`] to the SSE endpoint and to any in-process listener; nothing
//! in the control path depends on an event being received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::mode::{Mode, ModeState};

/// Which request queue an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Song,
    Replay,
}

/// Nightcast event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NightcastEvent {
    /// A mode transition was accepted
    ModeChanged {
        old_mode: Mode,
        new_mode: Mode,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A mode transition was refused by the priority policy
    ModeTransitionBlocked {
        current_mode: Mode,
        requested_mode: Mode,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A mode's attribute bag was merged with a patch
    ModeStateUpdated {
        state: ModeState,
        timestamp: DateTime<Utc>,
    },

    /// The "now playing" caption changed
    NowPlayingChanged {
        title: String,
        timestamp: DateTime<Utc>,
    },

    /// A request queue gained or lost entries
    RequestQueueChanged {
        queue: QueueKind,
        entries: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The capability backend connected or dropped
    CapabilityConnectionChanged {
        backend: String,
        connected: bool,
        timestamp: DateTime<Utc>,
    },

    /// A paced chat reply left the reply queue
    ChatReply {
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl NightcastEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            NightcastEvent::ModeChanged { .. } => "ModeChanged",
            NightcastEvent::ModeTransitionBlocked { .. } => "ModeTransitionBlocked",
            NightcastEvent::ModeStateUpdated { .. } => "ModeStateUpdated",
            NightcastEvent::NowPlayingChanged { .. } => "NowPlayingChanged",
            NightcastEvent::RequestQueueChanged { .. } => "RequestQueueChanged",
            NightcastEvent::CapabilityConnectionChanged { .. } => "CapabilityConnectionChanged",
            NightcastEvent::ChatReply { .. } => "ChatReply",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use nightcast_common::events::{EventBus, NightcastEvent};
/// use nightcast_common::Mode;
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(NightcastEvent::ModeChanged {
///     old_mode: Mode::Other,
///     new_mode: Mode::Playback,
///     reason: "startup".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NightcastEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<NightcastEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NightcastEvent,
    ) -> Result<usize, broadcast::error::SendError<NightcastEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NightcastEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
