//! Feed connection manager.
//!
//! Each connection id is driven by one supervising task that owns the
//! socket, the reconnect delay and the retry counter. Disconnecting cancels
//! the task's token, which aborts a pending delay or closes an open socket.

use crate::error::{WsError, WsResult};
use crate::message::{decode_feed_message, FeedUpdate};
use futures_util::{SinkExt, StreamExt};
use nexus_bus::{EventBus, EventKind, EventPayload};
use nexus_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Source tag on events published by feed connections.
pub const FEED_SOURCE: &str = "websocket";

/// How long `shutdown` waits for a connection task to finish its close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnect automatically after a failure.
    pub reconnect: bool,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Retry budget (0 = never retry).
    pub max_reconnect_attempts: u32,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: true,
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Disconnect requested on an open socket.
    Closing,
    ReconnectScheduled,
    /// Retry budget exhausted. Terminal until the next `connect`.
    Abandoned,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::Abandoned => "abandoned",
        }
    }

    /// Whether a supervising task is still driving this connection.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Open | Self::Closing | Self::ReconnectScheduled
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between the manager and a connection task.
struct ConnectionShared {
    id: String,
    config: FeedConfig,
    state: RwLock<ConnectionState>,
    attempts: AtomicU32,
    cancel: CancellationToken,
}

impl ConnectionShared {
    fn new(id: String, config: FeedConfig) -> Self {
        Self {
            id,
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            attempts: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = std::mem::replace(&mut *self.state.write(), state);
        if prev != state {
            debug!(id = %self.id, from = %prev, to = %state, "Feed state changed");
        }
        Metrics::feed_state_set(&self.id, state.as_str());
    }
}

struct ConnectionHandle {
    shared: Arc<ConnectionShared>,
    outbound_tx: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

/// Manages independently addressed feed connections.
pub struct FeedManager {
    bus: EventBus,
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl FeedManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Open a connection for `id`.
    ///
    /// Returns `false` (and logs a warning) when `id` already has an active
    /// connection. Must be called from within a tokio runtime.
    pub fn connect(&self, id: impl Into<String>, config: FeedConfig) -> bool {
        let id = id.into();
        let mut connections = self.connections.lock();

        if let Some(existing) = connections.get(&id) {
            let state = existing.shared.state();
            if state.is_active() && !existing.shared.cancel.is_cancelled() {
                warn!(id = %id, state = %state, "Connection already active, ignoring connect");
                return false;
            }
            existing.shared.cancel.cancel();
        }

        info!(id = %id, url = %config.url, "Starting feed connection");
        let shared = Arc::new(ConnectionShared::new(id.clone(), config));
        shared.set_state(ConnectionState::Connecting);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            Arc::clone(&shared),
            self.bus.clone(),
            outbound_rx,
        ));

        connections.insert(
            id,
            ConnectionHandle {
                shared,
                outbound_tx,
                task: Some(task),
            },
        );
        true
    }

    /// Send a JSON payload on an open connection.
    ///
    /// Returns `Ok(false)` without sending when `id` is unknown or not open.
    pub fn send<T: Serialize + ?Sized>(&self, id: &str, data: &T) -> WsResult<bool> {
        let connections = self.connections.lock();
        let Some(handle) = connections.get(id) else {
            return Ok(false);
        };
        if handle.shared.state() != ConnectionState::Open {
            debug!(id = %id, state = %handle.shared.state(), "Send skipped, connection not open");
            return Ok(false);
        }

        let text = serde_json::to_string(data)?;
        Ok(handle.outbound_tx.send(text).is_ok())
    }

    /// Close `id` and cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self, id: &str) {
        let connections = self.connections.lock();
        if let Some(handle) = connections.get(id) {
            Self::disconnect_handle(handle);
        }
    }

    pub fn disconnect_all(&self) {
        let connections = self.connections.lock();
        for handle in connections.values() {
            Self::disconnect_handle(handle);
        }
    }

    fn disconnect_handle(handle: &ConnectionHandle) {
        let shared = &handle.shared;
        if shared.cancel.is_cancelled() {
            return;
        }
        match shared.state() {
            ConnectionState::Open => shared.set_state(ConnectionState::Closing),
            ConnectionState::Abandoned => {}
            _ => shared.set_state(ConnectionState::Disconnected),
        }
        info!(id = %shared.id, "Disconnect requested");
        shared.cancel.cancel();
    }

    /// Disconnect everything and wait briefly for close frames to go out.
    pub async fn shutdown(&self) {
        self.disconnect_all();

        let tasks: Vec<(String, JoinHandle<()>)> = {
            let mut connections = self.connections.lock();
            connections
                .iter_mut()
                .filter_map(|(id, handle)| handle.task.take().map(|task| (id.clone(), task)))
                .collect()
        };

        for (id, task) in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!(id = %id, "Connection task did not finish within grace period");
            }
        }
    }

    /// Current state of `id`, if it was ever connected.
    pub fn state(&self, id: &str) -> Option<ConnectionState> {
        self.connections.lock().get(id).map(|h| h.shared.state())
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.state(id) == Some(ConnectionState::Open)
    }

    /// Current retry counter of `id`.
    pub fn reconnect_attempts(&self, id: &str) -> Option<u32> {
        self.connections
            .lock()
            .get(id)
            .map(|h| h.shared.attempts.load(Ordering::SeqCst))
    }

    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        for handle in self.connections.get_mut().values() {
            handle.shared.cancel.cancel();
        }
    }
}

/// Supervising loop for one connection id.
async fn run_connection(
    shared: Arc<ConnectionShared>,
    bus: EventBus,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    supervise(&shared, &bus, &mut outbound_rx).await;

    if shared.cancel.is_cancelled() && shared.state() != ConnectionState::Abandoned {
        shared.set_state(ConnectionState::Disconnected);
    }
    debug!(id = %shared.id, "Connection task finished");
}

async fn supervise(
    shared: &ConnectionShared,
    bus: &EventBus,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
) {
    let id = shared.id.as_str();
    let config = &shared.config;

    loop {
        if shared.cancel.is_cancelled() {
            return;
        }

        // Sends are not queued across connections.
        while outbound_rx.try_recv().is_ok() {}

        shared.set_state(ConnectionState::Connecting);
        info!(id = %id, url = %config.url, "Connecting to feed");

        let connected = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => return,
            result = connect_async(config.url.as_str()) => result,
        };

        match connected {
            Ok((ws_stream, _response)) => {
                shared.attempts.store(0, Ordering::SeqCst);
                shared.set_state(ConnectionState::Open);
                info!(id = %id, "Feed connected");
                bus.publish(
                    EventKind::ConnectionOpened,
                    EventPayload::Connection { id: id.to_string() },
                    FEED_SOURCE,
                );

                match pump(shared, bus, ws_stream, outbound_rx).await {
                    Ok(()) => info!(id = %id, "Feed connection closed"),
                    Err(e) => error!(id = %id, error = %e, "Feed connection error"),
                }

                bus.publish(
                    EventKind::ConnectionClosed,
                    EventPayload::Connection { id: id.to_string() },
                    FEED_SOURCE,
                );
            }
            Err(e) => {
                let err = WsError::ConnectionFailed(e.to_string());
                error!(id = %id, url = %config.url, error = %err, "Feed connect failed");
            }
        }

        if shared.cancel.is_cancelled() {
            return;
        }
        shared.set_state(ConnectionState::Disconnected);

        if !config.reconnect {
            return;
        }

        let attempts = shared.attempts.load(Ordering::SeqCst);
        if attempts >= config.max_reconnect_attempts {
            error!(
                id = %id,
                attempts,
                max = config.max_reconnect_attempts,
                "Max reconnection attempts reached, abandoning feed"
            );
            shared.set_state(ConnectionState::Abandoned);
            Metrics::feed_abandoned(id);
            return;
        }

        let attempt = attempts + 1;
        shared.attempts.store(attempt, Ordering::SeqCst);
        shared.set_state(ConnectionState::ReconnectScheduled);
        Metrics::feed_reconnect(id);
        warn!(
            id = %id,
            attempt,
            delay_ms = config.reconnect_delay.as_millis() as u64,
            "Reconnect scheduled"
        );

        tokio::select! {
            () = tokio::time::sleep(config.reconnect_delay) => {}
            () = shared.cancel.cancelled() => {
                info!(id = %id, "Pending reconnect cancelled");
                return;
            }
        }
    }
}

/// Message loop for an open socket.
async fn pump<S>(
    shared: &ConnectionShared,
    bus: &EventBus,
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
) -> WsResult<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let id = shared.id.as_str();
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    warn!(id = %id, error = %e, "Failed to send close frame");
                }
                return Ok(());
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(id, bus, &text),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_text(id, bus, text),
                        Err(e) => {
                            warn!(id = %id, error = %e, "Dropping non-UTF-8 binary frame");
                            Metrics::feed_parse_error(id);
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        debug!(id = %id, "Received ping, sending pong");
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(id = %id, code, %reason, "Feed closed by server");
                        return Err(WsError::ConnectionClosed { code, reason });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        warn!(id = %id, "Feed stream ended");
                        return Ok(());
                    }
                }
            }

            outbound = outbound_rx.recv() => {
                if let Some(text) = outbound {
                    write.send(Message::Text(text)).await?;
                }
            }
        }
    }
}

/// Decode one frame and publish it. Never fails the connection.
fn handle_text(id: &str, bus: &EventBus, text: &str) {
    match decode_feed_message(text) {
        Ok(FeedUpdate::Trade(trade)) => {
            Metrics::feed_message(id, "trade");
            bus.publish(EventKind::Trade, EventPayload::Trade(trade), FEED_SOURCE);
        }
        Ok(FeedUpdate::Tick(tick)) => {
            Metrics::feed_message(id, "ticker");
            bus.publish(EventKind::Tick, EventPayload::Tick(tick), FEED_SOURCE);
        }
        Err(e) => {
            warn!(id = %id, error = %e, "Dropping unparseable feed message");
            Metrics::feed_parse_error(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::new("wss://example.invalid/ws");
        assert_eq!(config.url, "wss://example.invalid/ws");
        assert!(config.reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::ReconnectScheduled.to_string(), "reconnect_scheduled");
        assert!(ConnectionState::Closing.is_active());
        assert!(!ConnectionState::Abandoned.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
    }

    #[test]
    fn test_send_without_connection_is_noop() {
        let manager = FeedManager::new(EventBus::new(10));
        assert!(!manager.send("missing", &serde_json::json!({"op": "ping"})).unwrap());
        assert_eq!(manager.state("missing"), None);
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let manager = FeedManager::new(EventBus::new(10));
        manager.disconnect("missing");
        manager.disconnect("missing");
        manager.disconnect_all();
        assert!(manager.connection_ids().is_empty());
    }

    #[test]
    fn test_handle_text_publishes_and_drops() {
        let bus = EventBus::new(10);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let _sub = bus.subscribe(EventKind::Tick, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        handle_text(
            "unit",
            &bus,
            r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","P":"1","c":"100","h":"110","l":"90","v":"5"}"#,
        );
        handle_text("unit", &bus, "garbage");

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(bus.history(Some(EventKind::Tick), 10)[0].source, FEED_SOURCE);
    }

    #[tokio::test]
    async fn test_unreachable_without_reconnect_ends_disconnected() {
        let manager = FeedManager::new(EventBus::new(10));
        let config = FeedConfig {
            url: "ws://127.0.0.1:1".to_string(),
            reconnect: false,
            ..Default::default()
        };

        assert!(manager.connect("dead", config));
        for _ in 0..100 {
            if manager.state("dead") == Some(ConnectionState::Disconnected) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(manager.state("dead"), Some(ConnectionState::Disconnected));
        assert_eq!(manager.reconnect_attempts("dead"), Some(0));
    }

    #[tokio::test]
    async fn test_zero_budget_abandons_without_retry() {
        let manager = FeedManager::new(EventBus::new(10));
        let config = FeedConfig {
            url: "ws://127.0.0.1:1".to_string(),
            reconnect: true,
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: 0,
        };

        manager.connect("zero", config);
        for _ in 0..100 {
            if manager.state("zero") == Some(ConnectionState::Abandoned) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(manager.state("zero"), Some(ConnectionState::Abandoned));
        assert_eq!(manager.reconnect_attempts("zero"), Some(0));
    }
}
