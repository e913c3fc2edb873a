//! Persistent stream connection with auto-reconnect, signed handshake, and
//! keepalive.
//!
//! One `StreamConnection` runs as a tokio task that:
//! 1. Connects to the feed WebSocket endpoint (TLS) with signed auth headers.
//! 2. Replays every desired subscription, then marks the session `Ready`.
//! 3. Forwards inbound text frames to the router channel.
//! 4. Sends periodic pings and treats a silent connection as lost.
//! 5. Reconnects on disconnection with capped exponential backoff + jitter,
//!    indefinitely, until shut down.
//!
//! The connection state {Connecting, Ready, Reconnecting, Closed} is
//! published through a watch channel; the market-data cache uses anything
//! other than `Ready` as a signal to prefer the fallback source. No inbound
//! frame is read before the replay completes, so consumers never see data
//! from a session that is not fully re-subscribed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::subs::SubscriptionManager;
use crate::auth::FeedSigner;
use crate::error::WtError;
use crate::types::ConnState;

/// Configuration for the stream connection.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Full WebSocket URL (e.g. `wss://api.example.com/stream/v1`).
    pub url: String,
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Silence window after which the session is treated as lost.
    pub pong_timeout: Duration,
    /// Reconnect backoff base delay.
    pub backoff_base: Duration,
    /// Reconnect backoff cap.
    pub backoff_max: Duration,
}

/// A persistent feed connection managed by a background tokio task.
///
/// Shared behind `Arc`: consumers send and observe state through `&self`,
/// including shutdown.
pub struct StreamConnection {
    outbound_tx: mpsc::Sender<String>,
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ConnState>,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StreamConnection {
    /// Start the connection task.
    ///
    /// Inbound text frames are forwarded to `frame_tx`; `subs` is replayed on
    /// every (re)connect before the state flips to `Ready`. `signer` is used
    /// to build the handshake headers for each attempt.
    pub fn start(
        config: StreamConfig,
        signer: Option<Arc<FeedSigner>>,
        subs: Arc<SubscriptionManager>,
        frame_tx: mpsc::Sender<String>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let (state_tx, state_rx) = watch::channel(ConnState::Connecting);

        let task = tokio::spawn(async move {
            connection_loop(config, signer, subs, frame_tx, outbound_rx, shutdown_rx, state_tx)
                .await;
        });

        Self {
            outbound_tx,
            shutdown_tx,
            state_rx,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        *self.state_rx.borrow()
    }

    /// Watch handle for consumers that react to state transitions.
    pub fn state_watch(&self) -> watch::Receiver<ConnState> {
        self.state_rx.clone()
    }

    /// Send a text frame on the live session.
    ///
    /// Fails with [`WtError::NotConnected`] when no ready session exists.
    pub async fn send(&self, frame: String) -> Result<(), WtError> {
        if self.state() != ConnState::Ready {
            return Err(WtError::NotConnected);
        }
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| WtError::NotConnected)
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

/// Main connection loop — connects, authenticates, resubscribes, reads,
/// pings, reconnects.
async fn connection_loop(
    config: StreamConfig,
    signer: Option<Arc<FeedSigner>>,
    subs: Arc<SubscriptionManager>,
    frame_tx: mpsc::Sender<String>,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<ConnState>,
) {
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_max);

    'reconnect: loop {
        if *shutdown_rx.borrow() {
            break;
        }

        info!("[stream] connecting to {}", config.url);

        let ws_stream = match connect_ws(&config, signer.as_deref()).await {
            Ok(s) => {
                backoff.reset();
                info!("[stream] connected");
                s
            }
            Err(e) => {
                let delay = backoff.next();
                match &e {
                    WtError::Auth(_) => error!("[stream] handshake rejected: {e}, retrying in {delay:?}"),
                    _ => error!("[stream] connection failed: {e}, retrying in {delay:?}"),
                }
                let _ = state_tx.send(ConnState::Reconnecting);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = shutdown_rx.changed() => break 'reconnect,
                }
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Replay all desired subscriptions before trusting the session. The
        // replay guard is held across the sends and the Ready transition, so
        // subscription requests racing the replay are queued behind it.
        {
            let replay = subs.begin_replay().await;
            let frames = replay.subscribe_frames();
            let mut failed = false;
            for frame in &frames {
                debug!("[stream] resubscribing: {frame}");
                if let Err(e) = ws_write.send(Message::Text(frame.clone().into())).await {
                    error!("[stream] resubscribe send failed: {e}");
                    failed = true;
                    break;
                }
            }
            if failed {
                drop(replay);
                let delay = backoff.next();
                let _ = state_tx.send(ConnState::Reconnecting);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = shutdown_rx.changed() => break 'reconnect,
                }
                continue;
            }
            info!("[stream] replayed {} subscription(s), session ready", frames.len());
            let _ = state_tx.send(ConnState::Ready);
        }

        let mut ping_tick = tokio::time::interval(config.ping_interval);
        ping_tick.tick().await; // skip the immediate first tick
        let mut last_activity = Instant::now();

        // Main read/write loop
        loop {
            tokio::select! {
                // Shutdown signal
                _ = shutdown_rx.changed() => {
                    info!("[stream] shutdown signal received");
                    let _ = ws_write.close().await;
                    break 'reconnect;
                }

                // Incoming message
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            if frame_tx.send(text.to_string()).await.is_err() {
                                // Router gone — the service is tearing down.
                                break 'reconnect;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_activity = Instant::now();
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_activity = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[stream] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[stream] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[stream] stream ended");
                            break;
                        }
                        _ => {} // Binary, Frame — ignore
                    }
                }

                // Outbound message from callers
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                        error!("[stream] send error: {e}");
                        break;
                    }
                }

                // Keepalive: ping, and give up on a silent session
                _ = ping_tick.tick() => {
                    if last_activity.elapsed() > config.pong_timeout {
                        warn!(
                            "[stream] no traffic for {:?}, treating session as lost",
                            last_activity.elapsed()
                        );
                        break;
                    }
                    if let Err(e) = ws_write.send(Message::Ping(vec![].into())).await {
                        error!("[stream] ping send error: {e}");
                        break;
                    }
                }
            }
        }

        // Disconnected — will reconnect at the top of the outer loop
        let delay = backoff.next();
        warn!("[stream] disconnected, reconnecting in {delay:?}");
        let _ = state_tx.send(ConnState::Reconnecting);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown_rx.changed() => break 'reconnect,
        }
    }

    let _ = state_tx.send(ConnState::Closed);
    info!("[stream] closed");
}

/// Establish a TLS WebSocket connection with signed handshake headers.
async fn connect_ws(
    config: &StreamConfig,
    signer: Option<&FeedSigner>,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WtError,
> {
    use tokio_tungstenite::tungstenite::http::Request;

    let parsed =
        url::Url::parse(&config.url).map_err(|e| WtError::Config(format!("bad ws url: {e}")))?;
    let host = parsed.host_str().unwrap_or_default().to_string();

    let mut request = Request::builder().uri(config.url.as_str()).header("Host", host);

    if let Some(signer) = signer {
        for (key, value) in signer.handshake_headers("GET", parsed.path()) {
            request = request.header(key, value);
        }
    }

    let request =
        request.body(()).map_err(|e| WtError::Config(format!("bad ws request: {e}")))?;

    match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => Ok(stream),
        Err(tokio_tungstenite::tungstenite::Error::Http(resp))
            if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 =>
        {
            Err(WtError::Auth(format!("handshake rejected with {}", resp.status())))
        }
        Err(e) => Err(WtError::Transport(e.to_string())),
    }
}
