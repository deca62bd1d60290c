//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for price sources and broadcast targets.
pub mod ports;

/// Broadcast scheduling and connection lifecycle services.
pub mod services;
