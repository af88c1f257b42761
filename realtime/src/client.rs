// Realtime push client
// One WebSocket per client, reconnecting with a fixed delay once established

use crate::registry::{HandlerRegistry, Subscription};
use anyhow::{anyhow, Context, Result};
use common::{Envelope, NotifierConfig};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live connection task plus the queue feeding its writer
struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    online: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// How a single socket session ended
enum SessionEnd {
    /// Server went away; try again after the delay
    Dropped,
    /// The owning client is gone
    Shutdown,
}

pub struct RealtimeClient {
    url: String,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    connect_timeout: Duration,
    registry: Arc<HandlerRegistry>,
    connection: Mutex<Option<Connection>>,
}

impl RealtimeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            registry: Arc::new(HandlerRegistry::new()),
            connection: Mutex::new(None),
        }
    }

    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(config.url.clone())
            .with_reconnect_delay(config.reconnect_delay())
            .with_heartbeat_interval(config.heartbeat_interval())
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_heartbeat_interval(mut self, every: Duration) -> Self {
        self.heartbeat_interval = every;
        self
    }

    /// Bound on each handshake, so a stalled server cannot hold the connection lock
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the socket, or reuse the one already running.
    ///
    /// Only the first connection attempt reports failure to the caller; once
    /// established, drops are retried in the background every `reconnect_delay`.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if slot.as_ref().map_or(false, Connection::is_live) {
            debug!("Reusing push connection to {}", self.url);
            return Ok(());
        }

        info!("Connecting to push channel at {}", self.url);
        let (ws_stream, _) = timeout(self.connect_timeout, tokio_tungstenite::connect_async(&self.url))
            .await
            .map_err(|_| anyhow!("Timed out connecting to {} after {:?}", self.url, self.connect_timeout))?
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        info!("✅ Connected to push channel");

        let (outbound, queue) = mpsc::unbounded_channel();
        let online = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_connection(
            ws_stream,
            queue,
            self.url.clone(),
            self.registry.clone(),
            online.clone(),
            self.reconnect_delay,
            self.heartbeat_interval,
            self.connect_timeout,
        ));

        *slot = Some(Connection { outbound, online, task });
        Ok(())
    }

    /// Register `handler` for every inbound message of `event_type`
    pub fn on<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let id = self.registry.register(event_type, Arc::new(handler));
        Subscription::new(&self.registry, event_type, id)
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry.handler_count(event_type)
    }

    /// Queue an envelope for the server; fails while disconnected
    pub async fn send(&self, event_type: &str, payload: serde_json::Value) -> Result<()> {
        let text = serde_json::to_string(&Envelope::new(event_type, payload))?;

        let slot = self.connection.lock().await;
        let connection = slot
            .as_ref()
            .filter(|c| c.is_live() && c.online.load(Ordering::SeqCst))
            .ok_or_else(|| anyhow!("Push channel is not connected"))?;

        connection
            .outbound
            .send(Message::Text(text))
            .map_err(|_| anyhow!("Push connection task has stopped"))?;
        debug!("Queued {} for the server", event_type);
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        let slot = self.connection.lock().await;
        slot.as_ref()
            .map_or(false, |c| c.is_live() && c.online.load(Ordering::SeqCst))
    }

    /// A connection task exists, possibly between reconnect attempts
    pub async fn is_running(&self) -> bool {
        self.connection.lock().await.as_ref().map_or(false, Connection::is_live)
    }

    /// Stop the background task; handlers stay registered for the next connect
    pub async fn disconnect(&self) {
        if self.connection.lock().await.take().is_some() {
            info!("Disconnected from push channel at {}", self.url);
        }
    }
}

async fn run_connection(
    first: WsStream,
    mut queue: mpsc::UnboundedReceiver<Message>,
    url: String,
    registry: Arc<HandlerRegistry>,
    online: Arc<AtomicBool>,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    connect_timeout: Duration,
) {
    let mut stream = Some(first);

    loop {
        if let Some(ws_stream) = stream.take() {
            online.store(true, Ordering::SeqCst);
            let end = run_session(ws_stream, &mut queue, &registry, heartbeat_interval).await;
            online.store(false, Ordering::SeqCst);

            if let SessionEnd::Shutdown = end {
                debug!("Push client dropped, closing connection task");
                return;
            }
        }

        info!("Reconnecting to {} in {:?}...", url, reconnect_delay);
        sleep(reconnect_delay).await;

        match timeout(connect_timeout, tokio_tungstenite::connect_async(&url)).await {
            Ok(Ok((ws_stream, _))) => {
                info!("✅ Reconnected to push channel");
                stream = Some(ws_stream);
            }
            Ok(Err(e)) => error!("Push channel reconnect failed: {}", e),
            Err(_) => error!("Push channel reconnect timed out after {:?}", connect_timeout),
        }
    }
}

async fn run_session(
    ws_stream: WsStream,
    queue: &mut mpsc::UnboundedReceiver<Message>,
    registry: &HandlerRegistry,
    heartbeat_interval: Duration,
) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);

    loop {
        tokio::select! {
            msg_result = read.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => handle_text(&text, registry),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            error!("Failed to send PONG response: {}", e);
                            return SessionEnd::Dropped;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => debug!("Received PONG"),
                    Some(Ok(Message::Close(_))) => {
                        info!("Push channel closed by server");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received unexpected binary message: {} bytes", data.len());
                    }
                    Some(Ok(Message::Frame(_))) => debug!("Received raw frame"),
                    Some(Err(e)) => {
                        error!("Push channel error: {}", e);
                        return SessionEnd::Dropped;
                    }
                    None => {
                        info!("Push channel stream ended");
                        return SessionEnd::Dropped;
                    }
                }
            }
            outgoing = queue.recv() => {
                let Some(message) = outgoing else {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = write.send(message).await {
                    error!("Failed to send to push channel: {}", e);
                    return SessionEnd::Dropped;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    error!("Failed to send heartbeat: {}", e);
                    return SessionEnd::Dropped;
                }
                debug!("Sent PING heartbeat");
            }
        }
    }
}

fn handle_text(text: &str, registry: &HandlerRegistry) {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => {
            let ran = registry.dispatch(&envelope);
            debug!("Dispatched {} to {} handler(s)", envelope.event_type, ran);
        }
        Err(e) => warn!("Discarding malformed push message: {} ({})", e, text),
    }
}
