//! Service Composition
//!
//! Wires the price source, scheduler, registry, gateway and HTTP router into
//! one service. Used by the binary and by integration tests.

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BroadcastPort, PriceSource};
use crate::application::services::{BroadcastScheduler, ConnectionRegistry};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::gateway::{ChannelGateway, GatewayConfig, SubscriberTable};
use crate::infrastructure::http::{self, AppState};
use crate::infrastructure::metrics::{self, MeteredBroadcast, MeteredSource};
use crate::infrastructure::price_feed::RandomWalkGenerator;

/// Fully wired price stream.
pub struct StreamService {
    registry: Arc<ConnectionRegistry>,
    gateway: Arc<ChannelGateway>,
    state: Arc<AppState>,
    socket_path: String,
}

impl StreamService {
    /// Wire the service around an arbitrary price source.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new<S>(config: &StreamConfig, source: S, shutdown: CancellationToken) -> Self
    where
        S: PriceSource + 'static,
    {
        let table = Arc::new(SubscriberTable::new());
        let sink: Arc<dyn BroadcastPort> = Arc::new(MeteredBroadcast::new(
            Arc::clone(&table) as Arc<dyn BroadcastPort>,
        ));
        let scheduler = BroadcastScheduler::new(Box::new(MeteredSource::new(source)), sink);
        let registry = Arc::new(ConnectionRegistry::new(
            scheduler,
            config.broadcast.tick_interval,
        ));

        let gateway = Arc::new(ChannelGateway::new(
            table,
            Arc::clone(&registry),
            GatewayConfig {
                subscriber_buffer: config.broadcast.subscriber_buffer,
                ping_interval: config.broadcast.ping_interval,
            },
            shutdown.clone(),
        ));

        let state = Arc::new(AppState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&gateway),
            shutdown,
        ));

        Self {
            registry,
            gateway,
            state,
            socket_path: config.server.socket_path.clone(),
        }
    }

    /// Wire the service around the random-walk generator.
    #[must_use]
    pub fn with_random_walk(config: &StreamConfig, shutdown: CancellationToken) -> Self {
        let generator = RandomWalkGenerator::new(config.generator.random_walk());
        Self::new(config, generator, shutdown)
    }

    /// HTTP router serving the realtime channel and health endpoints.
    #[must_use]
    pub fn router(&self) -> Router {
        http::router(Arc::clone(&self.state), &self.socket_path)
    }

    /// Connection registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Channel gateway.
    #[must_use]
    pub const fn gateway(&self) -> &Arc<ChannelGateway> {
        &self.gateway
    }

    /// Stop broadcasting and wait for the session task to finish.
    ///
    /// Connections still open afterwards are no longer counted.
    pub async fn shutdown(&self) {
        let dropped = self.registry.shutdown().await;
        metrics::record_shutdown(dropped);
        tracing::info!(dropped, "Broadcast registry shut down");
    }
}
