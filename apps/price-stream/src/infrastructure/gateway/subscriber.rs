//! Subscriber table and best-effort fan-out.
//!
//! Every subscriber owns a bounded outbound queue. Broadcasting only ever
//! `try_send`s into those queues, so the scheduler's tick never waits on a
//! slow socket: a full queue drops the frame for that subscriber alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Utf8Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::protocol::ServerMessage;
use crate::application::ports::{BroadcastPort, DeliveryReport};
use crate::domain::pricing::PriceUpdate;
use crate::domain::session::SubscriberId;

/// Result of queueing one frame for one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame queued.
    Queued,
    /// Queue full; frame dropped for this subscriber.
    Lagged,
    /// Receiving side is gone.
    Closed,
}

/// One connected client as seen by the fan-out path.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Utf8Bytes>,
    alive: AtomicBool,
}

impl Subscriber {
    /// Create a subscriber and the receiving end of its outbound queue.
    #[must_use]
    pub fn channel(id: SubscriberId, capacity: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                tx,
                alive: AtomicBool::new(true),
            },
            rx,
        )
    }

    /// Subscriber identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the outbound queue still has a reader.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: Utf8Bytes) -> Delivery {
        if !self.is_alive() {
            return Delivery::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Lagged,
            Err(TrySendError::Closed(_)) => {
                self.alive.store(false, Ordering::Release);
                Delivery::Closed
            }
        }
    }
}

/// Mapping from subscriber id to subscriber, shared by the gateway and the
/// scheduler's broadcast path.
#[derive(Debug, Default)]
pub struct SubscriberTable {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscriber>>>,
}

impl SubscriberTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Replaces any entry with the same id.
    pub fn insert(&self, subscriber: Subscriber) {
        self.subscribers
            .write()
            .insert(subscriber.id(), Arc::new(subscriber));
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    /// Check if a subscriber is present.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Queue a pre-encoded frame for every subscriber.
    pub fn broadcast_frame(&self, frame: &Utf8Bytes) -> DeliveryReport {
        let subscribers = self.subscribers.read();
        let mut report = DeliveryReport::default();

        for subscriber in subscribers.values() {
            match subscriber.try_deliver(frame.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Lagged => {
                    report.lagged += 1;
                    tracing::debug!(
                        subscriber = %subscriber.id(),
                        "Outbound queue full, frame dropped"
                    );
                }
                Delivery::Closed => {
                    report.closed += 1;
                    tracing::debug!(
                        subscriber = %subscriber.id(),
                        "Subscriber closed, awaiting disconnect"
                    );
                }
            }
        }

        report
    }
}

impl BroadcastPort for SubscriberTable {
    fn broadcast(&self, update: &PriceUpdate) -> DeliveryReport {
        match ServerMessage::PriceUpdate(update).to_frame() {
            Ok(frame) => self.broadcast_frame(&frame),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    instrument = %update.instrument,
                    "Failed to encode price update"
                );
                DeliveryReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::pricing::Instrument;

    fn update() -> PriceUpdate {
        PriceUpdate::new(Instrument::new("AAPL").unwrap(), Decimal::new(10_125, 2))
    }

    #[test]
    fn insert_and_remove() {
        let table = SubscriberTable::new();
        let id = SubscriberId::new();
        let (subscriber, _rx) = Subscriber::channel(id, 4);

        table.insert(subscriber);
        assert!(table.contains(id));
        assert_eq!(table.len(), 1);

        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert!(table.is_empty());
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let table = SubscriberTable::new();
        let (a, mut rx_a) = Subscriber::channel(SubscriberId::new(), 4);
        let (b, mut rx_b) = Subscriber::channel(SubscriberId::new(), 4);
        table.insert(a);
        table.insert(b);

        let report = table.broadcast(&update());

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed(), 0);
        let frame_a = rx_a.try_recv().unwrap();
        let frame_b = rx_b.try_recv().unwrap();
        assert_eq!(frame_a.as_str(), frame_b.as_str());
        assert!(frame_a.as_str().contains("\"price\":\"101.25\""));
    }

    #[test]
    fn full_queue_does_not_block_others() {
        let table = SubscriberTable::new();
        let (slow, _slow_rx) = Subscriber::channel(SubscriberId::new(), 1);
        let (fast, mut fast_rx) = Subscriber::channel(SubscriberId::new(), 8);
        table.insert(slow);
        table.insert(fast);

        table.broadcast(&update());
        let report = table.broadcast(&update());

        assert_eq!(report.delivered, 1);
        assert_eq!(report.lagged, 1);
        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn closed_subscriber_is_marked_dead() {
        let table = SubscriberTable::new();
        let (gone, gone_rx) = Subscriber::channel(SubscriberId::new(), 4);
        let (live, mut live_rx) = Subscriber::channel(SubscriberId::new(), 4);
        let gone_id = gone.id();
        table.insert(gone);
        table.insert(live);
        drop(gone_rx);

        let report = table.broadcast(&update());

        assert_eq!(report.delivered, 1);
        assert_eq!(report.closed, 1);
        assert!(live_rx.try_recv().is_ok());
        // Stays in the table until its connection reports the disconnect.
        assert!(table.contains(gone_id));

        let again = table.broadcast(&update());
        assert_eq!(again.closed, 1);
    }

    #[test]
    fn empty_table_reports_nothing() {
        let table = SubscriberTable::new();
        assert_eq!(table.broadcast(&update()), DeliveryReport::default());
    }

    #[test]
    fn subscriber_tracks_liveness() {
        let (subscriber, rx) = Subscriber::channel(SubscriberId::new(), 1);
        assert!(subscriber.is_alive());
        drop(rx);
        assert_eq!(subscriber.try_deliver(Utf8Bytes::from("x".to_string())), Delivery::Closed);
        assert!(!subscriber.is_alive());
    }
}
