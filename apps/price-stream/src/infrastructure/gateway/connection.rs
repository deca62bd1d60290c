//! Connection handling.
//!
//! `ChannelGateway::on_new_connection` turns an accepted client into a
//! [`Connection`]: it assigns an id, queues the welcome frame, adds the
//! subscriber to the fan-out table and registers it with the
//! [`ConnectionRegistry`]. The returned connection owns a [`DisconnectGuard`];
//! whatever way the connection ends, dropping the guard deregisters it once.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::protocol::ServerMessage;
use super::subscriber::{Subscriber, SubscriberTable};
use crate::application::services::ConnectionRegistry;
use crate::domain::session::SubscriberId;
use crate::infrastructure::metrics;

/// Gateway settings.
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Outbound queue capacity per subscriber.
    pub subscriber_buffer: usize,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Channel Gateway
// =============================================================================

/// Transport-facing entry point for realtime clients.
pub struct ChannelGateway {
    table: Arc<SubscriberTable>,
    registry: Arc<ConnectionRegistry>,
    config: GatewayConfig,
    shutdown: CancellationToken,
}

impl ChannelGateway {
    /// Create a gateway over a subscriber table and the registry that owns
    /// the scheduler broadcasting into that table.
    #[must_use]
    pub fn new(
        table: Arc<SubscriberTable>,
        registry: Arc<ConnectionRegistry>,
        config: GatewayConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            table,
            registry,
            config,
            shutdown,
        }
    }

    /// Register a newly accepted client.
    ///
    /// The welcome frame is queued before the subscriber becomes visible to
    /// the broadcast path, so it is always the first frame delivered.
    pub fn on_new_connection(&self) -> Connection {
        let id = SubscriberId::new();
        let (subscriber, outbound) = Subscriber::channel(id, self.config.subscriber_buffer);

        let instruments = self.registry.instruments();
        let welcome = ServerMessage::Welcome {
            subscriber_id: id,
            tick_interval_ms: u64::try_from(self.registry.tick_interval().as_millis())
                .unwrap_or(u64::MAX),
            instruments: &instruments,
        };
        match welcome.to_frame() {
            Ok(frame) => {
                subscriber.try_deliver(frame);
            }
            Err(e) => tracing::warn!(subscriber = %id, error = %e, "Failed to encode welcome"),
        }

        self.table.insert(subscriber);
        let change = self.registry.on_connect(id);
        metrics::record_connection(change);

        Connection {
            id,
            outbound,
            guard: DisconnectGuard {
                id,
                table: Arc::clone(&self.table),
                registry: Arc::clone(&self.registry),
            },
        }
    }

    /// Serve one upgraded WebSocket until the client leaves or the gateway
    /// shuts down.
    pub async fn serve(&self, socket: WebSocket) {
        let connection = self.on_new_connection();
        connection
            .pump(socket, self.config.ping_interval, self.shutdown.clone())
            .await;
    }

    /// Number of subscribers in the fan-out table.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.table.len()
    }

    /// Registry driving the scheduler.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One registered client: its outbound frames plus the guard that
/// deregisters it.
pub struct Connection {
    id: SubscriberId,
    outbound: mpsc::Receiver<Utf8Bytes>,
    guard: DisconnectGuard,
}

impl Connection {
    /// Subscriber identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next outbound frame.
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        self.outbound.recv().await
    }

    /// Take the next outbound frame if one is queued.
    pub fn try_recv(&mut self) -> Option<Utf8Bytes> {
        self.outbound.try_recv().ok()
    }

    /// Deregister now. Equivalent to dropping the connection.
    pub fn close(self) {
        drop(self);
    }

    async fn pump(
        mut self,
        socket: WebSocket,
        ping_interval: Duration,
        shutdown: CancellationToken,
    ) {
        let (mut ws_tx, mut ws_rx) = socket.split();

        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + ping_interval,
            ping_interval.max(Duration::from_millis(1)),
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }

                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(
                            subscriber = %self.id,
                            error = %e,
                            "WebSocket receive error"
                        );
                        break;
                    }
                },

                frame = self.outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                        tracing::debug!(subscriber = %self.id, error = %e, "WebSocket send failed");
                        break;
                    }
                }

                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        // Guard drops here.
        tracing::debug!(subscriber = %self.guard.id, "Connection loop ended");
    }
}

// =============================================================================
// Disconnect Guard
// =============================================================================

/// Deregisters a subscriber from the fan-out table and the registry when
/// dropped. Owned by exactly one [`Connection`], so this happens once.
pub struct DisconnectGuard {
    id: SubscriberId,
    table: Arc<SubscriberTable>,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.table.remove(self.id);
        let change = self.registry.on_disconnect(self.id);
        if !change.is_ignored() {
            metrics::record_disconnection(change);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
