//! HTTP control surface
//!
//! Operator and overlay endpoints on top of the coordinator, the playback
//! adapter and the chat dispatcher:
//!
//! - `GET /health`
//! - `GET /api/mode`, `POST /api/mode`
//! - `POST /api/chat`
//! - `GET /api/queue`
//! - `POST /api/playback/next`, `POST /api/playback/previous`
//! - `POST /api/signal/broadcast`, `POST /api/signal/pk`
//! - `GET /events` (SSE)

pub mod handlers;
pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use nightcast_common::EventBus;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::capability::CapabilityAdapter;
use crate::chat::ChatDispatcher;
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::library::Library;
use crate::mode::ModeCoordinator;
use crate::playback::MediaPlaybackAdapter;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub coordinator: Arc<ModeCoordinator>,
    pub adapter: Arc<MediaPlaybackAdapter>,
    pub library: Arc<Library>,
    pub dispatcher: Arc<ChatDispatcher>,
    pub capability: Arc<dyn CapabilityAdapter>,
    pub events: EventBus,
    pub started_at: Instant,
}

/// Build the router with every route attached
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Mode
        .route("/api/mode", get(handlers::get_mode).post(handlers::set_mode))
        // Chat bridge
        .route("/api/chat", post(handlers::chat))
        // Playback
        .route("/api/queue", get(handlers::get_queue))
        .route("/api/playback/next", post(handlers::skip_next))
        .route("/api/playback/previous", post(handlers::skip_previous))
        // Live-room signals
        .route("/api/signal/broadcast", post(handlers::broadcast_signal))
        .route("/api/signal/pk", post(handlers::pk_signal))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the router until `cancel` fires
pub async fn run(config: &HttpConfig, ctx: AppContext, cancel: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid HTTP bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
