//! Price Stream Binary
//!
//! Starts the realtime price broadcaster.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream
//! ```
//!
//! # Environment Variables
//!
//! - `PRICE_STREAM_PORT` / `PORT`: HTTP + WebSocket port (default: 4000)
//! - `PRICE_STREAM_SOCKET_PATH`: WebSocket route (default: /ws)
//! - `PRICE_STREAM_TICK_INTERVAL_MS`: Broadcast interval (default: 5000)
//! - `PRICE_STREAM_INSTRUMENTS`: Comma-separated tickers (default: AAPL,MSFT,GOOGL,AMZN,TSLA)
//! - `PRICE_STREAM_INITIAL_PRICE`: Starting price (default: 100.00)
//! - `PRICE_STREAM_VOLATILITY`: Max fractional move per tick (default: 0.01)
//! - `PRICE_STREAM_SUBSCRIBER_BUFFER`: Per-client outbound queue (default: 64)
//! - `PRICE_STREAM_PING_INTERVAL_SECS`: WebSocket keepalive (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-stream)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use price_stream::infrastructure::telemetry;
use price_stream::{HttpServer, StreamConfig, StreamService, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting price stream");

    let _metrics_handle = init_metrics();

    let config = StreamConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let service = StreamService::with_random_walk(&config, shutdown_token.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let server = HttpServer::bind(addr, service.router(), shutdown_token.clone())
        .await
        .context("failed to start HTTP server")?;

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!(socket_path = %config.server.socket_path, "Price stream ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "HTTP server did not drain in time"
        );
    }
    service.shutdown().await;

    tracing::info!("Price stream stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    let instruments: Vec<&str> = config
        .generator
        .instruments
        .iter()
        .map(price_stream::Instrument::as_str)
        .collect();

    tracing::info!(
        port = config.server.port,
        socket_path = %config.server.socket_path,
        tick_interval_ms = config.broadcast.tick_interval.as_millis(),
        instruments = %instruments.join(","),
        "Configuration loaded"
    );
    tracing::debug!(
        initial_price = %config.generator.initial_price,
        volatility = config.generator.volatility,
        subscriber_buffer = config.broadcast.subscriber_buffer,
        ping_interval_secs = config.broadcast.ping_interval.as_secs(),
        "Broadcast settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
