//! Listener request queue

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use nightcast_common::{EventBus, NightcastEvent, QueueKind};

/// One queued request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub display_name: String,
    pub path: PathBuf,
}

/// FIFO of requested files; duplicates allowed
///
/// Every mutation publishes `RequestQueueChanged` with the remaining names.
pub struct RequestQueue {
    kind: QueueKind,
    entries: Mutex<VecDeque<QueueEntry>>,
    events: EventBus,
}

impl RequestQueue {
    pub fn new(kind: QueueKind, events: EventBus) -> Self {
        Self {
            kind,
            entries: Mutex::new(VecDeque::new()),
            events,
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a request; returns the new length
    pub fn add(&self, path: PathBuf, display_name: impl Into<String>) -> usize {
        let (len, names) = {
            let mut entries = self.lock();
            entries.push_back(QueueEntry {
                display_name: display_name.into(),
                path,
            });
            (entries.len(), names_of(&entries))
        };
        self.publish(names);
        len
    }

    /// Remove and return the oldest request
    pub fn pop(&self) -> Option<QueueEntry> {
        let (entry, names) = {
            let mut entries = self.lock();
            let entry = entries.pop_front()?;
            (entry, names_of(&entries))
        };
        self.publish(names);
        Some(entry)
    }

    /// Display names in queue order
    pub fn list(&self) -> Vec<String> {
        names_of(&self.lock())
    }

    pub fn clear(&self) {
        let was_empty = {
            let mut entries = self.lock();
            let was_empty = entries.is_empty();
            entries.clear();
            was_empty
        };
        if !was_empty {
            self.publish(Vec::new());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn publish(&self, entries: Vec<String>) {
        self.events.emit_lossy(NightcastEvent::RequestQueueChanged {
            queue: self.kind,
            entries,
            timestamp: Utc::now(),
        });
    }
}

fn names_of(entries: &VecDeque<QueueEntry>) -> Vec<String> {
    entries.iter().map(|e| e.display_name.clone()).collect()
}
