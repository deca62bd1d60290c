//! Domain Layer - Core pricing types and session vocabulary.
//!
//! This layer contains the core domain types for price broadcasting with no
//! I/O. All types here are pure Rust with serialization support.

/// Instruments, price updates, and the random-walk step.
pub mod pricing;

/// Subscriber identity and scheduler lifecycle states.
pub mod session;
