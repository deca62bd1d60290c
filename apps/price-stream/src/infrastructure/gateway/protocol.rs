//! WebSocket protocol message types.
//!
//! Server → client frames are JSON text, tagged by `type`. Client → server
//! frames carry no meaning and are ignored (apart from Close).

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;

use crate::domain::pricing::{Instrument, PriceUpdate};
use crate::domain::session::SubscriberId;

/// Message sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// First frame on every connection.
    Welcome {
        /// Identifier assigned to this connection.
        subscriber_id: SubscriberId,
        /// Tick interval of the broadcast.
        tick_interval_ms: u64,
        /// Instruments that will appear in price updates.
        instruments: &'a [Instrument],
    },
    /// One tick's price update.
    PriceUpdate(&'a PriceUpdate),
}

impl ServerMessage<'_> {
    /// Encode as a text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if encoding fails.
    pub fn to_frame(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}
