//! OBS WebSocket v5 client
//!
//! One connection, two background tasks:
//! - a writer draining an unbounded channel into the socket
//! - a reader routing `RequestResponse` frames to their waiting callers
//!   (by `requestId`) and media events to subscribers
//!
//! A long-lived supervisor task owns reconnection. The reader signals it
//! through a [`Notify`] when the socket drops, so at most one reconnect loop
//! ever runs, and it stops as soon as the client's cancellation token fires.

pub mod protocol;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use nightcast_common::{EventBus, NightcastEvent};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use self::protocol::{Identify, Incoming, OpCode, Request, RequestResponse};
use super::{CapabilityAdapter, MediaAction, MediaEvent};
use crate::config::ObsConfig;
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Versions reported by `GetVersion`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsVersion {
    pub obs_version: String,
    pub websocket_version: String,
}

/// Handle to the OBS connection; cheap to clone
#[derive(Clone)]
pub struct ObsClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ObsConfig,
    connected: AtomicBool,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<RequestResponse>>>,
    media_events: broadcast::Sender<MediaEvent>,
    events: EventBus,
    disconnected: Notify,
    cancel: CancellationToken,
}

impl ObsClient {
    /// Create a disconnected client
    ///
    /// `cancel` is the daemon's shutdown token; the client derives a child
    /// token from it so [`shutdown`](Self::shutdown) only stops this client.
    pub fn new(config: ObsConfig, events: EventBus, cancel: &CancellationToken) -> Self {
        let (media_events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                config,
                connected: AtomicBool::new(false),
                writer: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                media_events,
                events,
                disconnected: Notify::new(),
                cancel: cancel.child_token(),
            }),
        }
    }

    /// Attempt the first connection and start the reconnect supervisor
    ///
    /// Returns whether the first attempt succeeded. Either way the client is
    /// usable: requests fail fast until the supervisor gets through.
    pub async fn start(&self) -> bool {
        let connected = match connect(&self.inner).await {
            Ok(()) => true,
            Err(e) => {
                warn!("OBS not reachable at startup: {}", e);
                self.inner.disconnected.notify_one();
                false
            }
        };
        tokio::spawn(supervise(self.inner.clone()));
        connected
    }

    /// Stop the reader, writer and supervisor tasks
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.mark_disconnected().await;
    }

    /// Send one request and wait for its response
    ///
    /// Returns `responseData` (or `Value::Null` when OBS sent none).
    pub async fn request(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
        let inner = &self.inner;
        if !inner.connected.load(Ordering::SeqCst) {
            return Err(Error::CapabilityUnavailable(format!(
                "OBS not connected ({})",
                request_type
            )));
        }

        let writer = inner
            .writer
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::CapabilityUnavailable("OBS writer closed".into()))?;

        let request_id = Uuid::new_v4().to_string();
        let text = protocol::encode(
            OpCode::Request,
            &Request {
                request_type,
                request_id: &request_id,
                request_data,
            },
        )?;

        let (tx, rx) = oneshot::channel();
        inner.pending.lock().await.insert(request_id.clone(), tx);

        if writer.send(Message::Text(text)).is_err() {
            inner.pending.lock().await.remove(&request_id);
            return Err(Error::CapabilityUnavailable("OBS writer closed".into()));
        }

        let response = match tokio::time::timeout(inner.request_timeout(), rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(Error::CapabilityUnavailable(format!(
                    "OBS connection dropped during {}",
                    request_type
                )))
            }
            Err(_) => {
                inner.pending.lock().await.remove(&request_id);
                return Err(Error::CapabilityUnavailable(format!(
                    "{} timed out after {:?}",
                    request_type,
                    inner.request_timeout()
                )));
            }
        };

        if !response.request_status.result {
            return Err(Error::Capability(format!(
                "{} failed (code {}): {}",
                request_type,
                response.request_status.code,
                response.request_status.comment.unwrap_or_default()
            )));
        }

        Ok(response.response_data.unwrap_or(Value::Null))
    }

    pub async fn version(&self) -> Result<ObsVersion> {
        let data = self.request("GetVersion", None).await?;
        let field = |name: &str| {
            data.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Protocol(format!("GetVersion response missing {}", name)))
        };
        Ok(ObsVersion {
            obs_version: field("obsVersion")?,
            websocket_version: field("obsWebSocketVersion")?,
        })
    }

    async fn scene_item_id(&self, source: &str) -> Result<i64> {
        let data = self
            .request(
                "GetSceneItemId",
                Some(json!({
                    "sceneName": self.inner.config.scene_name,
                    "sourceName": source,
                })),
            )
            .await?;

        data.get("sceneItemId")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Protocol("GetSceneItemId response missing sceneItemId".into()))
    }
}

#[async_trait]
impl CapabilityAdapter for ObsClient {
    fn name(&self) -> &str {
        "obs"
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn set_playlist(&self, files: &[PathBuf]) -> Result<()> {
        let playlist: Vec<Value> = files
            .iter()
            .map(|f| {
                json!({
                    "value": f.to_string_lossy(),
                    "hidden": false,
                    "selected": false,
                })
            })
            .collect();

        self.request(
            "SetInputSettings",
            Some(json!({
                "inputName": self.inner.config.media_source,
                "inputSettings": { "playlist": playlist },
                "overlay": true,
            })),
        )
        .await?;
        debug!("OBS playlist set ({} entries)", files.len());
        Ok(())
    }

    async fn trigger_media_action(&self, action: MediaAction) -> Result<()> {
        self.request(
            "TriggerMediaInputAction",
            Some(json!({
                "inputName": self.inner.config.media_source,
                "mediaAction": action.obs_action(),
            })),
        )
        .await?;
        Ok(())
    }

    async fn set_source_visible(&self, source: &str, visible: bool) -> Result<()> {
        let item_id = self.scene_item_id(source).await?;
        self.request(
            "SetSceneItemEnabled",
            Some(json!({
                "sceneName": self.inner.config.scene_name,
                "sceneItemId": item_id,
                "sceneItemEnabled": visible,
            })),
        )
        .await?;
        debug!("OBS source '{}' visible={}", source, visible);
        Ok(())
    }

    fn subscribe_media_events(&self) -> broadcast::Receiver<MediaEvent> {
        self.inner.media_events.subscribe()
    }
}

// ========================================
// Connection internals
// ========================================

impl Inner {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            self.events.emit_lossy(NightcastEvent::CapabilityConnectionChanged {
                backend: "obs".to_string(),
                connected,
                timestamp: Utc::now(),
            });
        }
    }

    /// Tear down writer and waiters after the socket is gone
    async fn mark_disconnected(&self) {
        let was_connected = self.connected.load(Ordering::SeqCst);
        self.set_connected(false);
        self.writer.lock().await.take();
        // Dropping the senders wakes every waiter with a closed-channel error
        self.pending.lock().await.clear();

        if was_connected {
            warn!("Disconnected from OBS");
        }
        if !self.cancel.is_cancelled() {
            self.disconnected.notify_one();
        }
    }

    async fn handle_text(&self, text: &str) {
        match protocol::decode(text) {
            Ok(Incoming::RequestResponse(response)) => {
                let waiter = self.pending.lock().await.remove(&response.request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!(
                        "Unmatched OBS response {} ({})",
                        response.request_id, response.request_type
                    ),
                }
            }
            Ok(Incoming::Event(event)) => {
                if event.input_name() != Some(self.config.media_source.as_str()) {
                    return;
                }
                let source = self.config.media_source.clone();
                let media_event = match event.event_type.as_str() {
                    protocol::EVENT_MEDIA_INPUT_PLAYBACK_STARTED => MediaEvent::PlaybackStarted { source },
                    protocol::EVENT_MEDIA_INPUT_PLAYBACK_ENDED => MediaEvent::PlaybackEnded { source },
                    _ => return,
                };
                let _ = self.media_events.send(media_event);
            }
            Ok(other) => debug!("Ignoring OBS frame: {:?}", other),
            Err(e) => warn!("Undecodable OBS frame: {}", e),
        }
    }
}

async fn connect(inner: &Arc<Inner>) -> Result<()> {
    let url = format!("ws://{}:{}", inner.config.host, inner.config.port);
    let timeout = inner.request_timeout();

    let (ws, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| Error::CapabilityUnavailable(format!("connecting to {} timed out", url)))?
        .map_err(|e| Error::CapabilityUnavailable(format!("connecting to {}: {}", url, e)))?;

    let (mut sink, mut stream) = ws.split();

    let identified = tokio::time::timeout(timeout, handshake(&inner.config, &mut sink, &mut stream))
        .await
        .map_err(|_| Error::CapabilityUnavailable("OBS handshake timed out".into()))??;

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("OBS writer stopped: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    *inner.writer.lock().await = Some(tx);
    inner.set_connected(true);
    info!(
        "Connected to OBS at {} (rpc v{})",
        url, identified.negotiated_rpc_version
    );

    tokio::spawn(read_loop(inner.clone(), stream));
    Ok(())
}

async fn handshake(
    config: &ObsConfig,
    sink: &mut SplitSink<WsStream, Message>,
    stream: &mut SplitStream<WsStream>,
) -> Result<protocol::Identified> {
    let hello = match next_incoming(stream).await? {
        Incoming::Hello(hello) => hello,
        other => return Err(Error::Protocol(format!("expected Hello, got {:?}", other))),
    };

    let authentication = hello.authentication.as_ref().map(|challenge| {
        if config.password.is_empty() {
            warn!("OBS requires authentication but obs.password is empty");
        }
        protocol::auth_response(&config.password, &challenge.salt, &challenge.challenge)
    });

    let identify = Identify {
        rpc_version: protocol::RPC_VERSION,
        authentication,
        event_subscriptions: protocol::EVENT_SUB_GENERAL | protocol::EVENT_SUB_MEDIA_INPUTS,
    };
    sink.send(Message::Text(protocol::encode(OpCode::Identify, &identify)?))
        .await
        .map_err(|e| Error::CapabilityUnavailable(format!("sending Identify: {}", e)))?;

    loop {
        if let Incoming::Identified(identified) = next_incoming(stream).await? {
            return Ok(identified);
        }
    }
}

async fn next_incoming(stream: &mut SplitStream<WsStream>) -> Result<Incoming> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return protocol::decode(&text),
            Some(Ok(Message::Close(frame))) => {
                return Err(Error::CapabilityUnavailable(format!(
                    "OBS closed the connection during handshake: {:?}",
                    frame
                )))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(Error::CapabilityUnavailable(e.to_string())),
            None => {
                return Err(Error::CapabilityUnavailable(
                    "OBS connection closed during handshake".into(),
                ))
            }
        }
    }
}

async fn read_loop(inner: Arc<Inner>, mut stream: SplitStream<WsStream>) {
    loop {
        let message = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => inner.handle_text(&text).await,
            Some(Ok(Message::Close(frame))) => {
                info!("OBS closed the connection: {:?}", frame);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("OBS connection error: {}", e);
                break;
            }
            None => break,
        }
    }

    inner.mark_disconnected().await;
}

/// Reconnect whenever the reader reports a dropped socket
async fn supervise(inner: Arc<Inner>) {
    let interval = Duration::from_secs(inner.config.reconnect_interval_secs.max(1));

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = inner.disconnected.notified() => {}
        }

        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    debug!("OBS supervisor stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            attempt += 1;
            match connect(&inner).await {
                Ok(()) => {
                    info!("Reconnected to OBS after {} attempt(s)", attempt);
                    break;
                }
                Err(e) => debug!("OBS reconnect attempt {} failed: {}", attempt, e),
            }
        }
    }

    debug!("OBS supervisor stopped");
}
