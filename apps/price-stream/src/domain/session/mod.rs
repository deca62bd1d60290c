//! Session Types
//!
//! Identity of connected subscribers and the lifecycle vocabulary shared by
//! the connection registry and the broadcast scheduler.
//!
//! # Design
//!
//! A broadcast session exists exactly while at least one subscriber is
//! connected. The registry reports every connect/disconnect as a
//! [`RegistryChange`] so callers can see whether the event started or
//! stopped the session, and how many subscribers remain.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

// =============================================================================
// Subscriber Identity
// =============================================================================

/// Unique identifier for one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// =============================================================================
// Scheduler State
// =============================================================================

/// State of the broadcast scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// No session; no ticks fire.
    #[default]
    Stopped,
    /// A session is ticking.
    Running,
}

impl SchedulerState {
    /// Check if the scheduler is running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

// =============================================================================
// Registry Transitions
// =============================================================================

/// Effect of a connect or disconnect event on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryTransition {
    /// First subscriber arrived; the broadcast session was started.
    Started,
    /// Another subscriber joined a running session.
    Joined,
    /// A subscriber left; others remain.
    Left,
    /// Last subscriber left; the broadcast session was stopped.
    Stopped,
    /// Event referred to an id already in (or absent from) the registry.
    Ignored,
}

impl RegistryTransition {
    /// Whether this event changed the scheduler state.
    #[must_use]
    pub const fn changed_scheduler(self) -> bool {
        matches!(self, Self::Started | Self::Stopped)
    }
}

/// A registry transition together with the subscriber count it left behind,
/// both observed under the same lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryChange {
    /// What the event did.
    pub transition: RegistryTransition,
    /// Connected subscribers after the event.
    pub active: usize,
}

impl RegistryChange {
    /// Whether the event was ignored.
    #[must_use]
    pub const fn is_ignored(self) -> bool {
        matches!(self.transition, RegistryTransition::Ignored)
    }
}
