//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Service composition.
pub mod bootstrap;

/// Configuration loading from the environment.
pub mod config;

/// WebSocket channel gateway and subscriber fan-out.
pub mod gateway;

/// HTTP server: WebSocket endpoint, health checks, and metrics.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Random-walk price generator.
pub mod price_feed;

/// OpenTelemetry tracing integration.
pub mod telemetry;
