//! nightcast-ctl - Main entry point
//!
//! Loads the configuration, connects the media backend, wires the mode
//! coordinator to its observers and runs the watchdogs, the chat reply
//! sender and the HTTP surface until Ctrl+C or SIGTERM.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use nightcast_common::config::resolve_config_path;
use nightcast_common::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nightcast_ctl::api::{self, AppContext};
use nightcast_ctl::capability::{CapabilityAdapter, ObsClient, VlcHttpClient};
use nightcast_ctl::chat::{run_reply_sender, ChatDispatcher, EventReplySink, ReplyQueue};
use nightcast_ctl::config::{Backend, Config, LoggingConfig};
use nightcast_ctl::library::Library;
use nightcast_ctl::mode::ModeCoordinator;
use nightcast_ctl::playback::{MediaDirs, MediaPlaybackAdapter};
use nightcast_ctl::scene::SceneVisibility;
use nightcast_ctl::watchdog::Watchdog;

const DEFAULT_LOG_FILTER: &str = "nightcast_ctl=info,nightcast_common=info";

/// Event bus depth; slow SSE clients beyond this lag and skip events
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for nightcast-ctl
#[derive(Parser, Debug)]
#[command(name = "nightcast-ctl")]
#[command(about = "Mode coordinator and playback controller for an unattended livestream")]
#[command(version)]
struct Args {
    /// Configuration file (default: ./nightcast.toml, then the user config dir)
    #[arg(short, long, env = "NIGHTCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" or "nightcast_ctl=trace"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(args.log_level.as_deref(), &config.logging)?;

    info!(
        "Starting nightcast-ctl v{} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Configuration: {}", config_path.display());

    let cancel = CancellationToken::new();
    let events = EventBus::new(EVENT_BUS_CAPACITY);

    // Library
    if let Err(e) = std::fs::create_dir_all(&config.paths.data_dir) {
        warn!(
            "Cannot create data directory {}: {}",
            config.paths.data_dir.display(),
            e
        );
    }
    let now_playing_file = config.paths.now_playing_file();
    let library = Arc::new(Library::open(
        &config.paths.song_dir,
        config.paths.replay_dir.as_deref(),
        Some(now_playing_file.as_path()),
        events.clone(),
    ));
    info!(
        "Library: {} song(s), {} replay(s)",
        library.songs.total(),
        library.replays.total()
    );

    // Capability backend
    let mut obs_client: Option<Arc<ObsClient>> = None;
    let mut vlc_client: Option<Arc<VlcHttpClient>> = None;
    let capability: Arc<dyn CapabilityAdapter> = match config.capability.backend {
        Backend::Obs => {
            let client = Arc::new(ObsClient::new(config.obs.clone(), events.clone(), &cancel));
            if client.start().await {
                match client.version().await {
                    Ok(version) => info!(
                        "Connected to OBS {} (websocket {})",
                        version.obs_version, version.websocket_version
                    ),
                    Err(e) => warn!("Connected to OBS but version query failed: {}", e),
                }
            } else {
                warn!(
                    "OBS not reachable at {}:{}; retrying every {}s",
                    config.obs.host, config.obs.port, config.obs.reconnect_interval_secs
                );
            }
            obs_client = Some(client.clone());
            client
        }
        Backend::Vlc => {
            let client = Arc::new(VlcHttpClient::new(&config.vlc, events.clone())?);
            if client.is_reachable().await {
                info!("Connected to VLC at {}:{}", config.vlc.host, config.vlc.port);
            } else {
                warn!(
                    "VLC not reachable at {}:{}; actions will be retried",
                    config.vlc.host, config.vlc.port
                );
            }
            vlc_client = Some(client.clone());
            client
        }
    };

    // Playback + coordinator
    let adapter = Arc::new(MediaPlaybackAdapter::new(
        capability.clone(),
        library.clone(),
        MediaDirs {
            playback: config.paths.playback_dir().to_path_buf(),
            replay: config.paths.replay_dir.clone(),
        },
    ));
    let coordinator = Arc::new(ModeCoordinator::new(config.mode.policy, events.clone()));
    let scene = Arc::new(SceneVisibility::new(
        capability.clone(),
        config.obs.media_source.clone(),
        config.obs.broadcast_source.clone(),
    ));
    coordinator.register_observer(scene.clone()).await;
    coordinator.register_observer(adapter.clone()).await;
    coordinator.set_mode(config.mode.initial, "startup").await;
    info!(
        "Mode policy {:?}; started in {}",
        coordinator.policy(),
        coordinator.current_mode().await.key()
    );

    // Chat
    let (replies, reply_rx) = ReplyQueue::channel(config.chat.max_reply_chars);
    let dispatcher = Arc::new(ChatDispatcher::new(
        coordinator.clone(),
        adapter.clone(),
        library.clone(),
        replies,
        config.chat.owner_uid,
    ));

    // Background tasks
    let watchdog = Arc::new(
        Watchdog::new(
            coordinator.clone(),
            adapter.clone(),
            library.clone(),
            &config.watchdog,
        )
        .with_scene(scene),
    );
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(watchdog.clone().run_song_requests(cancel.clone())));
    tasks.push(tokio::spawn(
        watchdog.run_media_events(capability.subscribe_media_events(), cancel.clone()),
    ));
    if let Some(client) = vlc_client {
        tasks.push(tokio::spawn(client.run_status_poller(cancel.clone())));
    }
    tasks.push(tokio::spawn(run_reply_sender(
        reply_rx,
        Arc::new(EventReplySink::new(events.clone())),
        Duration::from_millis(config.chat.reply_interval_ms),
        cancel.clone(),
    )));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    // HTTP surface (runs until shutdown)
    let ctx = AppContext {
        coordinator,
        adapter,
        library,
        dispatcher,
        capability,
        events,
        started_at: Instant::now(),
    };
    let served = api::run(&config.http, ctx, cancel.clone()).await;

    cancel.cancel();
    if let Some(client) = obs_client {
        client.shutdown().await;
    }
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}

/// Registry + EnvFilter + fmt layer, plus an append-mode file layer when
/// `[logging] file` is set
///
/// Filter precedence: `--log-level`, `RUST_LOG`, `[logging] level`, default.
fn init_tracing(cli_level: Option<&str>, logging: &LoggingConfig) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            logging
                .level
                .as_deref()
                .and_then(|level| EnvFilter::try_new(level).ok())
                .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
        }),
    };

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
