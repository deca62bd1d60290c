//! Port Interfaces
//!
//! Defines the interfaces (ports) between the broadcast scheduler and the
//! outside world following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceSource`: produces the next price update for a tick
//! - `BroadcastPort`: fans an update out to every connected subscriber
//!
//! Both are synchronous on purpose: a tick must never wait on I/O.

use crate::domain::pricing::{Instrument, PriceUpdate};

// =============================================================================
// Price Source
// =============================================================================

/// Source of price updates, polled once per tick.
///
/// Implementations keep their own numeric state between calls and must be
/// safe to call indefinitely.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSource: Send {
    /// Produce the next price update.
    ///
    /// # Errors
    ///
    /// Returns `PriceSourceError` when no update can be produced for this
    /// tick. Callers skip the tick and keep polling.
    fn next(&mut self) -> Result<PriceUpdate, PriceSourceError>;

    /// Instruments this source produces prices for.
    fn instruments(&self) -> Vec<Instrument>;
}

/// Price source error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceSourceError {
    /// The source tracks no instruments.
    #[error("price source has no instruments")]
    NoInstruments,

    /// The computed price was not a finite number.
    #[error("non-finite price step for {instrument}")]
    NonFinite {
        /// Instrument whose step failed.
        instrument: String,
    },

    /// Upstream data could not be obtained.
    #[error("price data unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Broadcast Port
// =============================================================================

/// Fan-out target for price updates.
///
/// `broadcast` must not block: per-subscriber failures are absorbed and
/// reported in the returned [`DeliveryReport`], never propagated.
#[cfg_attr(test, mockall::automock)]
pub trait BroadcastPort: Send + Sync {
    /// Deliver an update to every currently registered subscriber.
    fn broadcast(&self, update: &PriceUpdate) -> DeliveryReport;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers the update was queued for.
    pub delivered: usize,
    /// Subscribers whose outbound queue was full (update dropped for them).
    pub lagged: usize,
    /// Subscribers whose transport was already closed.
    pub closed: usize,
}

impl DeliveryReport {
    /// Total number of failed deliveries.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.lagged + self.closed
    }

    /// Total number of subscribers attempted.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.failed()
    }
}
