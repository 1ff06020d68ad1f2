//! HTTP request handlers

use axum::{extract::State, http::StatusCode, response::Json};
use nightcast_common::{Mode, QueueKind};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::AppContext;
use crate::chat::{ChatMessage, DispatchOutcome};
use crate::mode::{AutoSwitch, ModeInfo};
use crate::playback::{NextOutcome, PlaybackStatus};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    uptime_secs: u64,
    backend: String,
    backend_connected: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

fn status_error(code: StatusCode, status: impl Into<String>) -> (StatusCode, Json<StatusResponse>) {
    (
        code,
        Json(StatusResponse {
            status: status.into(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    /// Mode key (`broadcast`, `pk`, ...) or label (`直播模式`, ...)
    mode: String,
    #[serde(default)]
    reason: Option<String>,
    /// Bypass the transition policy
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
pub struct SetModeResponse {
    accepted: bool,
    mode: Mode,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    mode: Mode,
    now_playing: String,
    song_queue: Vec<String>,
    replay_queue: Vec<String>,
    playback: PlaybackStatus,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    outcome: &'static str,
    now_playing: String,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastSignal {
    live: bool,
    #[serde(default)]
    viewers: u64,
    #[serde(default)]
    uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct PkSignal {
    active: bool,
    #[serde(default)]
    opponent: String,
}

#[derive(Debug, Serialize)]
pub struct SignalResponse {
    result: AutoSwitch,
    mode: Mode,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "nightcast-ctl".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        backend: ctx.capability.name().to_string(),
        backend_connected: ctx.capability.is_connected(),
    })
}

// ============================================================================
// Mode
// ============================================================================

/// GET /api/mode
pub async fn get_mode(State(ctx): State<AppContext>) -> Json<ModeInfo> {
    Json(ctx.coordinator.get_mode_info().await)
}

/// POST /api/mode
pub async fn set_mode(
    State(ctx): State<AppContext>,
    Json(req): Json<SetModeRequest>,
) -> Result<Json<SetModeResponse>, (StatusCode, Json<StatusResponse>)> {
    let Some(target) = Mode::from_key(&req.mode).or_else(|| Mode::from_label(&req.mode)) else {
        return Err(status_error(
            StatusCode::BAD_REQUEST,
            format!("error: unknown mode '{}'", req.mode),
        ));
    };

    let reason = req.reason.unwrap_or_else(|| "http".to_string());
    info!("Mode request via HTTP: {} (force={})", target.key(), req.force);

    let accepted = if req.force {
        ctx.coordinator.force_mode(target, &reason).await
    } else {
        ctx.coordinator.set_mode(target, &reason).await
    };

    Ok(Json(SetModeResponse {
        accepted,
        mode: ctx.coordinator.current_mode().await,
    }))
}

// ============================================================================
// Chat
// ============================================================================

/// POST /api/chat - run one chat message through the dispatcher
pub async fn chat(State(ctx): State<AppContext>, Json(message): Json<ChatMessage>) -> Json<ChatResponse> {
    let outcome = match ctx.dispatcher.handle(&message).await {
        DispatchOutcome::Ignored => "ignored",
        DispatchOutcome::CoolingDown(_) => "cooling_down",
        DispatchOutcome::Handled(_) => "handled",
    };
    Json(ChatResponse { outcome })
}

// ============================================================================
// Playback
// ============================================================================

/// GET /api/queue
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    Json(QueueResponse {
        mode: ctx.coordinator.current_mode().await,
        now_playing: ctx.adapter.now_playing(),
        song_queue: ctx.library.song_queue.list(),
        replay_queue: ctx.library.replay_queue.list(),
        playback: ctx.adapter.status().await,
    })
}

/// POST /api/playback/next
pub async fn skip_next(
    State(ctx): State<AppContext>,
) -> Result<Json<SkipResponse>, (StatusCode, Json<StatusResponse>)> {
    let outcome = match ctx.adapter.next_song().await {
        NextOutcome::Playing(_) => "playing",
        NextOutcome::Skipped => "skipped",
        NextOutcome::Drained(QueueKind::Song) => {
            ctx.coordinator.auto_switch_for_song_request(0).await;
            "drained"
        }
        NextOutcome::Drained(QueueKind::Replay) => "drained",
        NextOutcome::Failed => {
            error!("Skip next failed");
            return Err(status_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "error: media backend did not accept the skip",
            ));
        }
    };

    Ok(Json(SkipResponse {
        outcome,
        now_playing: ctx.adapter.now_playing(),
    }))
}

/// POST /api/playback/previous
pub async fn skip_previous(
    State(ctx): State<AppContext>,
) -> Result<Json<SkipResponse>, (StatusCode, Json<StatusResponse>)> {
    if !ctx.adapter.previous().await {
        warn!("Skip previous failed");
        return Err(status_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "error: media backend did not accept the skip",
        ));
    }
    Ok(Json(SkipResponse {
        outcome: "skipped",
        now_playing: ctx.adapter.now_playing(),
    }))
}

// ============================================================================
// Live-room signals
// ============================================================================

/// POST /api/signal/broadcast - live status from the room watcher
pub async fn broadcast_signal(
    State(ctx): State<AppContext>,
    Json(signal): Json<BroadcastSignal>,
) -> Json<SignalResponse> {
    let result = ctx
        .coordinator
        .auto_switch_for_broadcast(signal.live, signal.viewers, signal.uptime_secs)
        .await;
    Json(SignalResponse {
        result,
        mode: ctx.coordinator.current_mode().await,
    })
}

/// POST /api/signal/pk - PK battle status from the room watcher
pub async fn pk_signal(State(ctx): State<AppContext>, Json(signal): Json<PkSignal>) -> Json<SignalResponse> {
    let result = ctx
        .coordinator
        .auto_switch_for_pk(signal.active, &signal.opponent)
        .await;
    Json(SignalResponse {
        result,
        mode: ctx.coordinator.current_mode().await,
    })
}
