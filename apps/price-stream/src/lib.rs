#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream - Connection-Driven Realtime Price Broadcast
//!
//! A WebSocket service that pushes synthetic price updates to every connected
//! client. The broadcast timer runs only while at least one client is
//! connected: the first connection starts it, the last disconnection stops it.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core pricing types and session vocabulary
//!   - `pricing`: Instruments, price updates, the random-walk step
//!   - `session`: Subscriber ids, scheduler states, registry transitions
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `PriceSource` and `BroadcastPort`
//!   - `services`: `BroadcastScheduler` and `ConnectionRegistry`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `price_feed`: Random-walk price generator
//!   - `gateway`: WebSocket channel gateway and subscriber fan-out
//!   - `http`: HTTP server, health checks, metrics endpoint
//!   - `config`: Environment configuration
//!   - `bootstrap`: Service composition
//!
//! # Data Flow
//!
//! ```text
//! connect ──► ChannelGateway ──► ConnectionRegistry ──0→1──► BroadcastScheduler::start
//!
//! tick:  PriceSource::next ──► SubscriberTable::broadcast ──┬─► Client 1
//!                                                           ├─► Client 2
//!                                                           └─► Client N
//!
//! leave ──► DisconnectGuard ──► ConnectionRegistry ──1→0──► BroadcastScheduler::stop
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core pricing types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pricing::{Instrument, InstrumentError, PriceUpdate};
pub use domain::session::{RegistryChange, RegistryTransition, SchedulerState, SubscriberId};

// Ports and services
pub use application::ports::{BroadcastPort, DeliveryReport, PriceSource, PriceSourceError};
pub use application::services::{
    BroadcastScheduler, ConnectionRegistry, RegistrySnapshot, SchedulerSnapshot,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, GeneratorSettings, ServerSettings, StreamConfig,
};

// Gateway and HTTP server
pub use infrastructure::bootstrap::StreamService;
pub use infrastructure::gateway::{ChannelGateway, Connection, GatewayConfig, SubscriberTable};
pub use infrastructure::http::{HttpServer, HttpServerError};

// Price feed
pub use infrastructure::price_feed::{RandomWalkConfig, RandomWalkGenerator};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
