//! Mode coordinator
//!
//! Single authority over the current broadcast mode:
//! - Checks every requested transition against the [`TransitionPolicy`]
//! - Commits accepted transitions and keeps the previous mode
//! - Notifies observers in registration order, isolating their failures
//! - Holds one attribute bag per mode, merged via typed patches
//!
//! # Concurrency
//!
//! Transitions are strictly serialized by `transition_lock`, which is held
//! from the policy check until the last observer has returned. Mode state
//! lives behind a separate `RwLock` that is released before observers run,
//! so readers (`get_mode_info`, chat replies, HTTP handlers) never wait on
//! capability I/O.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use nightcast_common::mode::{BroadcastPatch, PkPatch, SongRequestPatch};
use nightcast_common::{EventBus, Mode, ModeState, ModeStatePatch, NightcastEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::ModeObserver;

/// Rule deciding whether a requested transition is allowed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Refuse entering a mode whose priority number is higher (less urgent)
    /// than the current mode's
    #[default]
    Priority,
    /// Accept every transition
    Open,
}

impl TransitionPolicy {
    /// Whether `current` → `target` is permitted
    pub fn permits(self, current: Mode, target: Mode) -> bool {
        match self {
            TransitionPolicy::Priority => target.priority() <= current.priority(),
            TransitionPolicy::Open => true,
        }
    }
}

/// Read-only view of the coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeInfo {
    pub mode: Mode,
    pub label: String,
    pub previous_mode: Mode,
    pub changed_at: DateTime<Utc>,
    pub state: ModeState,
}

/// What an `auto_switch_for_*` helper ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSwitch {
    /// The signalled mode was entered (or was already current)
    Entered,
    /// The signal cleared and the coordinator returned to playback
    Returned,
    /// The policy refused the transition
    Blocked,
    /// The signal cleared but the coordinator was in some other mode
    Unchanged,
}

struct CoordinatorState {
    current: Mode,
    previous: Mode,
    changed_at: DateTime<Utc>,
    states: HashMap<Mode, ModeState>,
}

/// Owns the current mode and fans transitions out to observers
pub struct ModeCoordinator {
    policy: TransitionPolicy,
    transition_lock: Mutex<()>,
    state: RwLock<CoordinatorState>,
    observers: RwLock<Vec<Arc<dyn ModeObserver>>>,
    events: EventBus,
}

impl ModeCoordinator {
    /// Create a coordinator in [`Mode::Other`]
    ///
    /// The composition root enters the configured initial mode with an
    /// ordinary `set_mode` once observers are registered, so the first
    /// transition reaches every observer.
    pub fn new(policy: TransitionPolicy, events: EventBus) -> Self {
        Self::with_initial(policy, Mode::Other, events)
    }

    /// Create a coordinator already sitting in `initial` without notifying anyone
    pub fn with_initial(policy: TransitionPolicy, initial: Mode, events: EventBus) -> Self {
        let states = Mode::ALL
            .into_iter()
            .map(|m| (m, ModeState::default_for(m)))
            .collect();

        Self {
            policy,
            transition_lock: Mutex::new(()),
            state: RwLock::new(CoordinatorState {
                current: initial,
                previous: initial,
                changed_at: Utc::now(),
                states,
            }),
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Append an observer; notification order equals registration order
    pub async fn register_observer(&self, observer: Arc<dyn ModeObserver>) {
        debug!("Registering mode observer: {}", observer.name());
        self.observers.write().await.push(observer);
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    // ========================================
    // Transitions
    // ========================================

    /// Request a transition to `target`
    ///
    /// Returns `false` when the policy refuses it. Requesting the current
    /// mode is accepted as a no-op: observers are not notified and the
    /// change timestamp is kept.
    pub async fn set_mode(&self, target: Mode, reason: &str) -> bool {
        let _transition = self.transition_lock.lock().await;
        self.transition_locked(target, reason, true).await
    }

    /// Operator override: transition to `target` regardless of policy
    pub async fn force_mode(&self, target: Mode, reason: &str) -> bool {
        let _transition = self.transition_lock.lock().await;
        self.transition_locked(target, reason, false).await
    }

    /// Go back to playback, but only while still in `from`
    ///
    /// The check and the transition happen under the same transition lock,
    /// so a concurrent switch elsewhere is never undone.
    async fn return_to_playback_from(&self, from: Mode, reason: &str) -> AutoSwitch {
        let _transition = self.transition_lock.lock().await;
        if self.state.read().await.current != from {
            return AutoSwitch::Unchanged;
        }
        if self.transition_locked(Mode::Playback, reason, true).await {
            AutoSwitch::Returned
        } else {
            AutoSwitch::Blocked
        }
    }

    async fn transition_locked(&self, target: Mode, reason: &str, enforce_policy: bool) -> bool {
        let old = {
            let mut state = self.state.write().await;
            let current = state.current;

            if enforce_policy && !self.policy.permits(current, target) {
                drop(state);
                warn!(
                    "Mode transition blocked: {} -> {} (reason: {})",
                    current.key(),
                    target.key(),
                    reason
                );
                self.events.emit_lossy(NightcastEvent::ModeTransitionBlocked {
                    current_mode: current,
                    requested_mode: target,
                    reason: reason.to_string(),
                    timestamp: Utc::now(),
                });
                return false;
            }

            if current == target {
                debug!("Already in {}, nothing to do (reason: {})", target.key(), reason);
                return true;
            }

            state.previous = current;
            state.current = target;
            state.changed_at = Utc::now();
            current
        };

        info!(
            "Mode changed: {} -> {} (reason: {})",
            old.key(),
            target.key(),
            reason
        );

        self.notify_observers(old, target, reason).await;

        self.events.emit_lossy(NightcastEvent::ModeChanged {
            old_mode: old,
            new_mode: target,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        true
    }

    async fn notify_observers(&self, old: Mode, new: Mode, reason: &str) {
        let observers: Vec<Arc<dyn ModeObserver>> = self.observers.read().await.clone();

        for observer in observers {
            let outcome = AssertUnwindSafe(observer.on_mode_change(old, new, reason))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    "Mode observer '{}' failed on {} -> {}: {:#}",
                    observer.name(),
                    old.key(),
                    new.key(),
                    e
                ),
                Err(_) => error!(
                    "Mode observer '{}' panicked on {} -> {}",
                    observer.name(),
                    old.key(),
                    new.key()
                ),
            }
        }
    }

    // ========================================
    // State bags
    // ========================================

    /// Merge `patch` into the bag of the mode it targets
    pub async fn update_mode_state(&self, patch: ModeStatePatch) {
        let updated = {
            let mut state = self.state.write().await;
            let mode = patch.mode();
            let bag = state
                .states
                .entry(mode)
                .or_insert_with(|| ModeState::default_for(mode));
            bag.apply(&patch);
            bag.clone()
        };

        self.events.emit_lossy(NightcastEvent::ModeStateUpdated {
            state: updated,
            timestamp: Utc::now(),
        });
    }

    /// Copy of one mode's attribute bag
    pub async fn mode_state(&self, mode: Mode) -> ModeState {
        self.state
            .read()
            .await
            .states
            .get(&mode)
            .cloned()
            .unwrap_or_else(|| ModeState::default_for(mode))
    }

    pub async fn current_mode(&self) -> Mode {
        self.state.read().await.current
    }

    pub async fn previous_mode(&self) -> Mode {
        self.state.read().await.previous
    }

    /// Current mode, label, change time and the current mode's state bag
    pub async fn get_mode_info(&self) -> ModeInfo {
        let state = self.state.read().await;
        let mode = state.current;
        ModeInfo {
            mode,
            label: mode.label().to_string(),
            previous_mode: state.previous,
            changed_at: state.changed_at,
            state: state
                .states
                .get(&mode)
                .cloned()
                .unwrap_or_else(|| ModeState::default_for(mode)),
        }
    }

    // ========================================
    // Automatic switching
    // ========================================

    /// Follow the song request queue length
    ///
    /// A non-empty queue enters song-request mode; an empty one returns to
    /// playback only while song-request mode is current.
    pub async fn auto_switch_for_song_request(&self, queue_count: usize) -> AutoSwitch {
        if queue_count > 0 {
            let entered = self
                .set_mode(Mode::SongRequest, &format!("{} song request(s) pending", queue_count))
                .await;
            self.update_mode_state(ModeStatePatch::SongRequest(SongRequestPatch {
                queue_count: Some(queue_count),
                ..Default::default()
            }))
            .await;
            return if entered { AutoSwitch::Entered } else { AutoSwitch::Blocked };
        }

        self.update_mode_state(ModeStatePatch::SongRequest(SongRequestPatch {
            queue_count: Some(0),
            ..Default::default()
        }))
        .await;
        self.return_to_playback_from(Mode::SongRequest, "song request queue empty")
            .await
    }

    /// Follow the PK battle signal
    pub async fn auto_switch_for_pk(&self, is_active: bool, opponent_name: &str) -> AutoSwitch {
        self.update_mode_state(ModeStatePatch::Pk(PkPatch {
            is_active: Some(is_active),
            opponent_name: Some(opponent_name.to_string()),
            ..Default::default()
        }))
        .await;

        if is_active {
            let reason = format!("PK started against {}", opponent_name);
            if self.set_mode(Mode::Pk, &reason).await {
                AutoSwitch::Entered
            } else {
                AutoSwitch::Blocked
            }
        } else {
            self.return_to_playback_from(Mode::Pk, "PK ended").await
        }
    }

    /// Follow the live-broadcast signal
    pub async fn auto_switch_for_broadcast(
        &self,
        is_live: bool,
        viewer_count: u64,
        uptime_seconds: u64,
    ) -> AutoSwitch {
        self.update_mode_state(ModeStatePatch::Broadcast(BroadcastPatch {
            is_active: Some(is_live),
            viewer_count: Some(viewer_count),
            uptime_seconds: Some(uptime_seconds),
        }))
        .await;

        if is_live {
            if self.set_mode(Mode::Broadcast, "broadcast went live").await {
                AutoSwitch::Entered
            } else {
                AutoSwitch::Blocked
            }
        } else {
            self.return_to_playback_from(Mode::Broadcast, "broadcast ended")
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nightcast_common::mode::OtherPatch;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        name: String,
        calls: Arc<StdMutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl ModeObserver for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_mode_change(&self, old: Mode, new: Mode, _reason: &str) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}->{}", self.name, old.key(), new.key()));
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn coordinator_in(mode: Mode) -> ModeCoordinator {
        ModeCoordinator::with_initial(TransitionPolicy::Priority, mode, EventBus::new(32))
    }

    #[test]
    fn test_priority_policy_table() {
        let p = TransitionPolicy::Priority;
        assert!(p.permits(Mode::Playback, Mode::Broadcast));
        assert!(p.permits(Mode::Playback, Mode::SongRequest));
        assert!(p.permits(Mode::Other, Mode::Playback));
        assert!(!p.permits(Mode::Broadcast, Mode::Playback));
        assert!(!p.permits(Mode::Pk, Mode::Other));
        assert!(TransitionPolicy::Open.permits(Mode::Broadcast, Mode::Other));
    }

    #[tokio::test]
    async fn test_new_starts_in_other() {
        let coordinator = ModeCoordinator::new(TransitionPolicy::Priority, EventBus::new(8));
        assert_eq!(coordinator.current_mode().await, Mode::Other);
        assert_eq!(coordinator.previous_mode().await, Mode::Other);
    }

    #[tokio::test]
    async fn test_accepted_transition_records_previous() {
        let coordinator = coordinator_in(Mode::Playback);
        assert!(coordinator.set_mode(Mode::Broadcast, "live").await);

        let info = coordinator.get_mode_info().await;
        assert_eq!(info.mode, Mode::Broadcast);
        assert_eq!(info.label, "直播模式");
        assert_eq!(info.previous_mode, Mode::Playback);
    }

    #[tokio::test]
    async fn test_same_mode_is_noop_without_notification() {
        let coordinator = coordinator_in(Mode::Playback);
        let calls = Arc::new(StdMutex::new(Vec::new()));
        coordinator
            .register_observer(Arc::new(Recorder {
                name: "a".into(),
                calls: calls.clone(),
                fail: false,
            }))
            .await;

        let before = coordinator.get_mode_info().await.changed_at;
        assert!(coordinator.set_mode(Mode::Playback, "again").await);
        assert_eq!(coordinator.get_mode_info().await.changed_at, before);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_transition_emits_event_and_keeps_mode() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let coordinator =
            ModeCoordinator::with_initial(TransitionPolicy::Priority, Mode::Broadcast, bus);

        assert!(!coordinator.set_mode(Mode::Playback, "chat").await);
        assert_eq!(coordinator.current_mode().await, Mode::Broadcast);

        match rx.try_recv().unwrap() {
            NightcastEvent::ModeTransitionBlocked {
                current_mode,
                requested_mode,
                ..
            } => {
                assert_eq!(current_mode, Mode::Broadcast);
                assert_eq!(requested_mode, Mode::Playback);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_mode_pair_follows_priority() {
        for from in Mode::ALL {
            for to in Mode::ALL {
                let coordinator = coordinator_in(from);
                let calls = Arc::new(StdMutex::new(Vec::new()));
                coordinator
                    .register_observer(Arc::new(Recorder {
                        name: "o".into(),
                        calls: calls.clone(),
                        fail: false,
                    }))
                    .await;
                let before = coordinator.get_mode_info().await;

                let accepted = coordinator.set_mode(to, "pair").await;
                let after = coordinator.get_mode_info().await;
                let pair = format!("{} -> {}", from.key(), to.key());

                assert_eq!(accepted, to.priority() <= from.priority(), "{}", pair);
                if from == to {
                    assert_eq!(after.changed_at, before.changed_at, "{}", pair);
                    assert!(calls.lock().unwrap().is_empty(), "{}", pair);
                } else if accepted {
                    assert_eq!(after.mode, to, "{}", pair);
                    assert_eq!(after.previous_mode, from, "{}", pair);
                    assert_eq!(calls.lock().unwrap().len(), 1, "{}", pair);
                } else {
                    assert_eq!(after.mode, from, "{}", pair);
                    assert_eq!(after.previous_mode, before.previous_mode, "{}", pair);
                    assert_eq!(after.changed_at, before.changed_at, "{}", pair);
                    assert!(calls.lock().unwrap().is_empty(), "{}", pair);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_holds_until_forced() {
        let coordinator = coordinator_in(Mode::Playback);

        assert!(coordinator.set_mode(Mode::Broadcast, "live").await);
        assert!(!coordinator.set_mode(Mode::Playback, "chat").await);
        assert_eq!(coordinator.current_mode().await, Mode::Broadcast);
        assert!(!coordinator.set_mode(Mode::Other, "idle").await);
        assert_eq!(coordinator.current_mode().await, Mode::Broadcast);

        let changed_at = coordinator.get_mode_info().await.changed_at;
        assert!(coordinator.set_mode(Mode::Broadcast, "still live").await);
        assert_eq!(coordinator.get_mode_info().await.changed_at, changed_at);
        assert_eq!(coordinator.previous_mode().await, Mode::Playback);
    }

    #[tokio::test]
    async fn test_force_mode_bypasses_policy() {
        let coordinator = coordinator_in(Mode::Broadcast);
        assert!(coordinator.force_mode(Mode::Other, "operator").await);
        assert_eq!(coordinator.current_mode().await, Mode::Other);
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_stop_later_ones() {
        let coordinator = coordinator_in(Mode::Playback);
        let calls = Arc::new(StdMutex::new(Vec::new()));
        for (name, fail) in [("first", true), ("second", false)] {
            coordinator
                .register_observer(Arc::new(Recorder {
                    name: name.into(),
                    calls: calls.clone(),
                    fail,
                }))
                .await;
        }

        assert!(coordinator.set_mode(Mode::Pk, "battle").await);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["first:playback->pk", "second:playback->pk"]
        );
        assert_eq!(coordinator.current_mode().await, Mode::Pk);
    }

    #[tokio::test]
    async fn test_update_mode_state_merges() {
        let coordinator = coordinator_in(Mode::Other);
        coordinator
            .update_mode_state(ModeStatePatch::Other(OtherPatch {
                message: Some("maintenance".into()),
            }))
            .await;

        let info = coordinator.get_mode_info().await;
        match info.state {
            ModeState::Other(s) => assert_eq!(s.message, "maintenance"),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_switch_for_song_request() {
        let coordinator = coordinator_in(Mode::Playback);

        assert_eq!(
            coordinator.auto_switch_for_song_request(2).await,
            AutoSwitch::Entered
        );
        assert_eq!(coordinator.current_mode().await, Mode::SongRequest);
        match coordinator.mode_state(Mode::SongRequest).await {
            ModeState::SongRequest(s) => assert_eq!(s.queue_count, 2),
            other => panic!("unexpected state {:?}", other),
        }

        assert_eq!(
            coordinator.auto_switch_for_song_request(0).await,
            AutoSwitch::Returned
        );
        assert_eq!(coordinator.current_mode().await, Mode::Playback);

        // Empty queue outside song-request mode leaves the mode alone
        assert_eq!(
            coordinator.auto_switch_for_song_request(0).await,
            AutoSwitch::Unchanged
        );
    }

    #[tokio::test]
    async fn test_auto_switch_for_pk_blocked_during_broadcast() {
        let coordinator = coordinator_in(Mode::Broadcast);
        // PK (2) ranks below broadcast (1)
        assert_eq!(
            coordinator.auto_switch_for_pk(true, "rival").await,
            AutoSwitch::Blocked
        );
        assert_eq!(coordinator.current_mode().await, Mode::Broadcast);
        match coordinator.mode_state(Mode::Pk).await {
            ModeState::Pk(s) => {
                assert!(s.is_active);
                assert_eq!(s.opponent_name, "rival");
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_switch_for_broadcast_cycle() {
        let coordinator = coordinator_in(Mode::Playback);
        assert_eq!(
            coordinator.auto_switch_for_broadcast(true, 10, 60).await,
            AutoSwitch::Entered
        );
        // Broadcast (1) -> Playback (2) is a demotion and refused under the
        // priority policy, even for the automatic return.
        assert_eq!(
            coordinator.auto_switch_for_broadcast(false, 0, 0).await,
            AutoSwitch::Blocked
        );
        assert_eq!(coordinator.current_mode().await, Mode::Broadcast);
    }

    #[tokio::test]
    async fn test_auto_return_from_pk() {
        let coordinator = coordinator_in(Mode::Playback);
        assert_eq!(coordinator.auto_switch_for_pk(true, "x").await, AutoSwitch::Entered);
        assert_eq!(coordinator.auto_switch_for_pk(false, "x").await, AutoSwitch::Returned);
        assert_eq!(coordinator.current_mode().await, Mode::Playback);
    }
}
