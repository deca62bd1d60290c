//! Connection Registry
//!
//! Tracks the set of connected subscribers and ties the broadcast
//! scheduler's lifecycle to it: the first connection starts the session and
//! the last disconnection stops it.
//!
//! # Thread Safety
//!
//! The subscriber set and the scheduler sit behind one `parking_lot::Mutex`,
//! so a count change and the matching start/stop are applied atomically.
//! Concurrent connect/disconnect events can never leave the scheduler running
//! with zero subscribers, or stopped with one or more.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;

use crate::application::services::scheduler::{BroadcastScheduler, SchedulerSnapshot};
use crate::domain::pricing::Instrument;
use crate::domain::session::{RegistryChange, RegistryTransition, SubscriberId};

struct RegistryState {
    subscribers: HashSet<SubscriberId>,
    scheduler: BroadcastScheduler,
}

/// Set of live connections plus the scheduler they keep alive.
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    tick_interval: Duration,
}

impl ConnectionRegistry {
    /// Create an empty registry that drives `scheduler` at `tick_interval`.
    #[must_use]
    pub fn new(scheduler: BroadcastScheduler, tick_interval: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                subscribers: HashSet::new(),
                scheduler,
            }),
            tick_interval,
        }
    }

    /// Register a new connection.
    ///
    /// Starts the scheduler if this is the first subscriber. Registering an
    /// id that is already present is ignored.
    pub fn on_connect(&self, id: SubscriberId) -> RegistryChange {
        let mut state = self.state.lock();
        let active = state.subscribers.len();

        if !state.subscribers.insert(id) {
            tracing::debug!(subscriber = %id, "Subscriber already registered");
            return RegistryChange {
                transition: RegistryTransition::Ignored,
                active,
            };
        }

        let active = active + 1;
        let transition = if active == 1 {
            state.scheduler.start(self.tick_interval);
            RegistryTransition::Started
        } else {
            RegistryTransition::Joined
        };

        tracing::info!(subscriber = %id, active, "Subscriber connected");
        RegistryChange { transition, active }
    }

    /// Deregister a connection.
    ///
    /// Stops the scheduler if no subscribers remain. Removing an unknown id
    /// is ignored, so a repeated disconnect for the same connection is safe.
    pub fn on_disconnect(&self, id: SubscriberId) -> RegistryChange {
        let mut state = self.state.lock();

        if !state.subscribers.remove(&id) {
            tracing::debug!(subscriber = %id, "Subscriber not registered");
            return RegistryChange {
                transition: RegistryTransition::Ignored,
                active: state.subscribers.len(),
            };
        }

        let active = state.subscribers.len();
        let transition = if active == 0 {
            state.scheduler.stop();
            RegistryTransition::Stopped
        } else {
            RegistryTransition::Left
        };

        tracing::info!(subscriber = %id, active, "Subscriber disconnected");
        RegistryChange { transition, active }
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Check if a subscriber is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.state.lock().subscribers.contains(&id)
    }

    /// Whether the broadcast scheduler is running.
    #[must_use]
    pub fn is_broadcasting(&self) -> bool {
        self.state.lock().scheduler.is_running()
    }

    /// Instruments covered by the broadcast.
    #[must_use]
    pub fn instruments(&self) -> Vec<Instrument> {
        self.state.lock().scheduler.instruments()
    }

    /// Configured tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Consistent view of the subscriber count and scheduler statistics.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock();
        RegistrySnapshot {
            active: state.subscribers.len(),
            scheduler: state.scheduler.snapshot(),
        }
    }

    /// Stop broadcasting regardless of connected subscribers.
    ///
    /// Waits for an in-flight tick to finish. Used on process shutdown.
    /// Returns the number of subscribers that were still registered; their
    /// later disconnects are reported as ignored.
    pub async fn shutdown(&self) -> usize {
        let (dropped, handle) = {
            let mut state = self.state.lock();
            let dropped = state.subscribers.len();
            state.subscribers.clear();
            (dropped, state.scheduler.halt())
        };

        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Broadcast session ended abnormally");
        }
        dropped
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Connected subscribers.
    pub active: usize,
    /// Scheduler statistics.
    pub scheduler: SchedulerSnapshot,
}
