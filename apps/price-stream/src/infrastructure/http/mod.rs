//! HTTP Server
//!
//! One listener serves the realtime WebSocket channel together with health
//! checks and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /ws` (configurable) - WebSocket upgrade into the channel gateway
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (NOT READY once shutting down)
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! Unknown routes answer `404` with `{"success": false, "message": ...}`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::application::services::SchedulerSnapshot;
use crate::infrastructure::gateway::ChannelGateway;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connected subscribers.
    pub subscribers: usize,
    /// Broadcast scheduler statistics.
    pub scheduler: SchedulerSnapshot,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Scheduler state matches subscriber presence.
    Healthy,
    /// Scheduler state disagrees with subscriber presence.
    Degraded,
}

impl HealthStatus {
    /// Derive status from the subscriber count and scheduler snapshot.
    #[must_use]
    pub const fn assess(subscribers: usize, scheduler: &SchedulerSnapshot) -> Self {
        if scheduler.state.is_running() == (subscribers > 0) {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

/// Error body for failed requests.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable reason.
    pub message: String,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP handlers.
pub struct AppState {
    version: String,
    started_at: Instant,
    gateway: Arc<ChannelGateway>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, gateway: Arc<ChannelGateway>, shutdown: CancellationToken) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            gateway,
            shutdown,
        }
    }

    fn health(&self) -> HealthResponse {
        let snapshot = self.gateway.registry().snapshot();
        HealthResponse {
            status: HealthStatus::assess(snapshot.active, &snapshot.scheduler),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            subscribers: snapshot.active,
            scheduler: snapshot.scheduler,
        }
    }
}

/// Routes served alongside the WebSocket channel.
pub const RESERVED_PATHS: &[&str] = &["/health", "/healthz", "/readyz", "/metrics"];

/// Build the application router.
///
/// # Panics
///
/// Panics if `socket_path` is one of [`RESERVED_PATHS`] or is not a valid
/// static route; configuration loading rejects both.
#[must_use]
pub fn router(state: Arc<AppState>, socket_path: &str) -> Router {
    Router::new()
        .route(socket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server bound to its listener.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Bind the listener.
    ///
    /// Binding happens before any route is served, so the port is known to be
    /// open by the time clients can upgrade to the realtime channel.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::BindFailed` if the port cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        router: Router,
        cancel: CancellationToken,
    ) -> Result<Self, HttpServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(addr.port(), e.to_string()))?;
        Ok(Self {
            listener,
            router,
            cancel,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, HttpServerError> {
        self.listener
            .local_addr()
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` if the server hits a fatal error.
    pub async fn run(self) -> Result<(), HttpServerError> {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "HTTP server listening");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move { state.gateway.serve(socket).await })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health()))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            message: format!("route {} not found", uri.path()),
        }),
    )
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
