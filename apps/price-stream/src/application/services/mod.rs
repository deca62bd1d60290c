//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `BroadcastScheduler`: runs the periodic generate-and-broadcast session
//! - `ConnectionRegistry`: tracks subscribers and starts/stops the scheduler

mod registry;
mod scheduler;

pub use registry::{ConnectionRegistry, RegistrySnapshot};
pub use scheduler::{BroadcastScheduler, MIN_TICK_INTERVAL, SchedulerSnapshot};
