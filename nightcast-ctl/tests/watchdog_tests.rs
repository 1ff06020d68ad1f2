//! Watchdog integration tests
//!
//! Ticks are driven by hand with explicit instants, so no test sleeps
//! through a real poll interval.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{Call, Harness};
use nightcast_common::{Mode, QueueKind};
use nightcast_ctl::capability::{CapabilityAdapter, MediaAction, MediaEvent};
use nightcast_ctl::config::WatchdogConfig;
use nightcast_ctl::mode::TransitionPolicy;
use nightcast_ctl::playback::PlaybackKey;
use nightcast_ctl::watchdog::{RequestTimer, TickAction, Watchdog};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

fn watchdog(h: &Harness) -> Arc<Watchdog> {
    Arc::new(
        Watchdog::new(
            h.coordinator.clone(),
            h.adapter.clone(),
            h.library.clone(),
            &WatchdogConfig::default(),
        )
        .with_scene(h.scene.clone()),
    )
}

async fn in_song_request() -> Harness {
    let h = Harness::in_playback().await;
    assert!(h.coordinator.set_mode(Mode::SongRequest, "request").await);
    h
}

#[tokio::test]
async fn test_stuck_request_times_out_and_returns_to_playback() {
    let h = in_song_request().await;
    assert!(h.adapter.play(&h.tree.song("晴天.mp3")).await);
    let wd = watchdog(&h);
    let mut timer = RequestTimer::default();
    let start = Instant::now();

    assert_eq!(wd.tick(&mut timer, start).await, TickAction::Nothing);
    assert_eq!(
        wd.tick(&mut timer, start + Duration::from_secs(600)).await,
        TickAction::Nothing
    );
    assert_eq!(
        wd.tick(&mut timer, start + Duration::from_secs(901)).await,
        TickAction::TimedOut
    );

    assert!(!h.adapter.has_song_request().await);
    assert_eq!(h.coordinator.current_mode().await, Mode::Playback);
    assert_eq!(h.adapter.current_key().await, PlaybackKey::Video);
}

#[tokio::test]
async fn test_timeout_moves_on_to_next_queued_request() {
    let h = in_song_request().await;
    assert!(h.adapter.play(&h.tree.song("晴天.mp3")).await);
    h.library.song_queue.add(h.tree.song("夜曲.flv"), "夜曲");
    let wd = watchdog(&h);
    let mut timer = RequestTimer::default();
    let start = Instant::now();

    wd.tick(&mut timer, start).await;
    assert_eq!(
        wd.tick(&mut timer, start + Duration::from_secs(900)).await,
        TickAction::TimedOut
    );
    assert_eq!(h.coordinator.current_mode().await, Mode::SongRequest);
    assert_eq!(h.adapter.now_playing(), "夜曲");
    assert!(h.library.song_queue.is_empty());
}

#[tokio::test]
async fn test_queued_request_is_started() {
    let h = in_song_request().await;
    h.library.song_queue.add(h.tree.song("稻香.mp4"), "稻香");
    let wd = watchdog(&h);

    let action = wd.tick(&mut RequestTimer::default(), Instant::now()).await;
    assert_eq!(action, TickAction::StartedQueued(QueueKind::Song));
    assert!(h.adapter.has_song_request().await);
    assert_eq!(h.adapter.now_playing(), "稻香");
}

#[tokio::test]
async fn test_idle_song_request_mode_returns_after_two_polls() {
    let h = in_song_request().await;
    let wd = watchdog(&h);
    let mut timer = RequestTimer::default();
    let now = Instant::now();

    assert_eq!(wd.tick(&mut timer, now).await, TickAction::Idle(1));
    assert_eq!(h.coordinator.current_mode().await, Mode::SongRequest);
    assert_eq!(wd.tick(&mut timer, now).await, TickAction::ReturnedToPlayback);
    assert_eq!(h.coordinator.current_mode().await, Mode::Playback);
    assert_eq!(wd.tick(&mut timer, now).await, TickAction::Nothing);
}

#[tokio::test]
async fn test_request_during_broadcast_is_cleared() {
    let h = Harness::in_playback().await;
    assert!(h.coordinator.set_mode(Mode::Broadcast, "went live").await);
    assert!(h.adapter.play(&h.tree.song("晴天.mp3")).await);
    let wd = watchdog(&h);

    let action = wd.tick(&mut RequestTimer::default(), Instant::now()).await;
    assert_eq!(action, TickAction::ClearedForPriority);
    assert!(!h.adapter.has_song_request().await);
    assert_eq!(h.adapter.current_key().await, PlaybackKey::Broadcast);
    assert_eq!(h.capability.last_action(), Some(MediaAction::Stop));
    assert!(!h.adapter.status().await.snapshots.contains(&"music"));
}

#[tokio::test]
async fn test_queued_replay_starts_during_playback() {
    let h = Harness::in_playback().await;
    h.library
        .replay_queue
        .add(h.tree.path("replays").join("2024010101.mp4"), "2024010101");
    let wd = watchdog(&h);

    let action = wd.tick(&mut RequestTimer::default(), Instant::now()).await;
    assert_eq!(action, TickAction::StartedQueued(QueueKind::Replay));
    assert!(h.adapter.has_replay_request().await);
}

#[tokio::test]
async fn test_tick_reconciles_pending_action() {
    let h = Harness::in_playback().await;
    h.capability.set_connected(false);
    assert!(h.coordinator.set_mode(Mode::Broadcast, "went live").await);
    assert!(h.adapter.status().await.pending);

    h.capability.set_connected(true);
    let wd = watchdog(&h);
    wd.tick(&mut RequestTimer::default(), Instant::now()).await;
    assert!(!h.adapter.status().await.pending);
}

#[tokio::test]
async fn test_playback_ended_advances_then_returns() {
    let h = in_song_request().await;
    assert!(h.adapter.play(&h.tree.song("晴天.mp3")).await);
    h.library.song_queue.add(h.tree.song("稻香.mp4"), "稻香");
    let wd = watchdog(&h);
    let ended = || MediaEvent::PlaybackEnded {
        source: "vlc_player".into(),
    };

    wd.handle_media_event(ended()).await;
    assert_eq!(h.adapter.now_playing(), "稻香");
    assert_eq!(h.coordinator.current_mode().await, Mode::SongRequest);

    wd.handle_media_event(ended()).await;
    assert_eq!(h.coordinator.current_mode().await, Mode::Playback);

    // Rotation files ending on their own are not requests
    h.capability.clear();
    wd.handle_media_event(ended()).await;
    assert!(h.capability.calls().is_empty());
}

#[tokio::test]
async fn test_loops_stop_on_cancel() {
    let h = in_song_request().await;
    assert!(h.adapter.play(&h.tree.song("晴天.mp3")).await);
    let wd = watchdog(&h);
    let cancel = CancellationToken::new();

    let events = tokio::spawn(
        wd.clone()
            .run_media_events(h.capability.subscribe_media_events(), cancel.clone()),
    );
    let poll = tokio::spawn(wd.run_song_requests(cancel.clone()));

    h.capability.end_playback();
    timeout(Duration::from_secs(5), async {
        while h.coordinator.current_mode().await != Mode::Playback {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("playback-ended event was not handled");

    cancel.cancel();
    timeout(Duration::from_secs(5), events).await.unwrap().unwrap();
    timeout(Duration::from_secs(5), poll).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_scene_visibility_is_reapplied_after_reconnect() {
    let h = Harness::new(TransitionPolicy::Priority).await;
    h.capability.set_connected(false);
    assert!(h.coordinator.set_mode(Mode::Playback, "startup").await);
    assert_eq!(h.scene.pending().await, Some(Mode::Playback));

    h.capability.set_connected(true);
    let wd = watchdog(&h);
    let mut timer = RequestTimer::default();
    wd.tick(&mut timer, Instant::now()).await;

    let calls = h.capability.calls();
    assert_eq!(
        calls[..2],
        [
            Call::Visible("vlc_player".into(), true),
            Call::Visible("broadcast_screen".into(), false),
        ]
    );
    assert_eq!(calls.last(), Some(&Call::Action(MediaAction::Restart)));
    assert_eq!(h.scene.pending().await, None);

    // Nothing left to re-apply
    h.capability.clear();
    wd.tick(&mut timer, Instant::now()).await;
    assert!(h.capability.calls().is_empty());
}

#[tokio::test]
async fn test_scene_reconcile_applies_latest_mode() {
    let h = Harness::in_playback().await;
    h.capability.set_connected(false);
    assert!(h.coordinator.set_mode(Mode::Pk, "pk started").await);
    assert!(h.coordinator.set_mode(Mode::Broadcast, "went live").await);
    assert!(!h.scene.reconcile().await);

    h.capability.set_connected(true);
    assert!(h.scene.reconcile().await);
    assert_eq!(
        h.capability.calls(),
        vec![
            Call::Visible("vlc_player".into(), false),
            Call::Visible("broadcast_screen".into(), true),
        ]
    );
    assert!(!h.scene.reconcile().await);
}

#[tokio::test]
async fn test_song_request_does_not_survive_broadcast() {
    let h = Harness::new(TransitionPolicy::Open).await;
    assert!(h.coordinator.set_mode(Mode::Playback, "startup").await);
    assert!(h.coordinator.set_mode(Mode::SongRequest, "request").await);
    assert!(h.adapter.play(&h.tree.song("晴天.mp3")).await);
    assert!(h.coordinator.set_mode(Mode::Broadcast, "went live").await);

    let wd = watchdog(&h);
    assert_eq!(
        wd.tick(&mut RequestTimer::default(), Instant::now()).await,
        TickAction::Nothing
    );
    assert!(!h.adapter.status().await.snapshots.contains(&"music"));

    h.capability.clear();
    assert!(h.coordinator.set_mode(Mode::SongRequest, "request again").await);
    assert!(!h.adapter.has_song_request().await);
    assert_eq!(h.capability.last_playlist(), None);
}

#[tokio::test]
async fn test_started_events_follow_the_rotation() {
    let h = Harness::in_playback().await;
    let wd = watchdog(&h);
    let started = || MediaEvent::PlaybackStarted {
        source: "vlc_player".into(),
    };

    wd.handle_media_event(started()).await;
    assert_eq!(h.adapter.now_playing(), "A");
    wd.handle_media_event(started()).await;
    assert_eq!(h.adapter.now_playing(), "B");

    let cancel = CancellationToken::new();
    let events = tokio::spawn(
        wd.clone()
            .run_media_events(h.capability.subscribe_media_events(), cancel.clone()),
    );
    h.capability.start_playback();
    timeout(Duration::from_secs(5), async {
        while h.adapter.now_playing() != "C" {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("playback-started event was not handled");
    assert!(h.capability.calls().is_empty());

    cancel.cancel();
    timeout(Duration::from_secs(5), events).await.unwrap().unwrap();
}
