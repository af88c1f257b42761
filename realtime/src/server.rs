// Notifier WebSocket server
// Forwards hub events to every client and client envelopes to the command channel

use crate::hub::NotifierHub;
use anyhow::{Context, Result};
use common::Envelope;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub struct NotifierServer {
    hub: Arc<NotifierHub>,
    inbound: mpsc::Sender<Envelope>,
    heartbeat_interval: Duration,
}

impl NotifierServer {
    pub fn new(hub: Arc<NotifierHub>, inbound: mpsc::Sender<Envelope>, heartbeat_interval: Duration) -> Self {
        Self {
            hub,
            inbound,
            heartbeat_interval,
        }
    }

    /// Accept connections until the listener fails
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!("🔔 Notifier listening on ws://{}", local);

        let server = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await.context("Failed to accept connection")?;
            // Subscribe before the handshake so nothing published after connect is missed
            let events = server.hub.subscribe();
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer, events).await {
                    warn!("Client {} disconnected with error: {:#}", peer, e);
                }
            });
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut events: broadcast::Receiver<Envelope>,
    ) -> Result<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .context("WebSocket handshake failed")?;
        info!("Client {} connected ({} total)", peer, self.hub.receiver_count());

        let (mut write, mut read) = ws_stream.split();
        let mut heartbeat = interval_at(Instant::now() + self.heartbeat_interval, self.heartbeat_interval);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(envelope) => {
                            let text = serde_json::to_string(&envelope)?;
                            write.send(Message::Text(text)).await.context("Failed to push event")?;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Client {} lagged, {} event(s) skipped", peer, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Hub closed, ending session for {}", peer);
                            break;
                        }
                    }
                }
                msg_result = read.next() => {
                    match msg_result {
                        Some(Ok(Message::Text(text))) => self.forward_inbound(peer, &text).await,
                        Some(Ok(Message::Ping(payload))) => {
                            write.send(Message::Pong(payload)).await.context("Failed to send PONG")?;
                        }
                        Some(Ok(Message::Pong(_))) => debug!("PONG from {}", peer),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(Message::Binary(data))) => {
                            warn!("Ignoring {} byte binary message from {}", data.len(), peer);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                _ = heartbeat.tick() => {
                    write.send(Message::Ping(Vec::new())).await.context("Failed to send heartbeat")?;
                }
            }
        }

        info!("Client {} disconnected", peer);
        Ok(())
    }

    async fn forward_inbound(&self, peer: SocketAddr, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                debug!("Inbound {} from {}", envelope.event_type, peer);
                if self.inbound.send(envelope).await.is_err() {
                    error!("Command channel closed, dropping message from {}", peer);
                }
            }
            Err(e) => warn!("Malformed message from {}: {}", peer, e),
        }
    }
}
