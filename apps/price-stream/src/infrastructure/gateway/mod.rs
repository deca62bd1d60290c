//! Channel Gateway
//!
//! WebSocket transport for realtime subscribers.
//!
//! # Architecture
//!
//! ```text
//! BroadcastScheduler ──broadcast()──► SubscriberTable ──try_send──► subscriber queue
//!                                                                      │
//!                                         Connection::pump ◄───────────┘
//!                                                  │
//!                                             WebSocket
//! ```
//!
//! - [`SubscriberTable`]: id → subscriber mapping; implements `BroadcastPort`
//! - [`ChannelGateway`]: accepts connections and wires the disconnect guard
//! - [`ServerMessage`]: JSON wire format

mod connection;
mod protocol;
mod subscriber;

pub use connection::{ChannelGateway, Connection, DisconnectGuard, GatewayConfig};
pub use protocol::ServerMessage;
pub use subscriber::{Delivery, Subscriber, SubscriberTable};
