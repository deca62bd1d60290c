//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Connections**: subscriber connects, disconnects, and the live count
//! - **Scheduler**: running flag, sessions started, generator failures
//! - **Delivery**: updates delivered and per-subscriber delivery failures
//! - **Latency**: time spent fanning out one tick
//!
//! Recording happens in infrastructure adapters ([`MeteredSource`],
//! [`MeteredBroadcast`]) and the channel gateway; the application layer stays
//! free of metrics calls.
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::ports::{
    BroadcastPort, DeliveryReport, PriceSource, PriceSourceError,
};
use crate::domain::pricing::{Instrument, PriceUpdate};
use crate::domain::session::{RegistryChange, RegistryTransition};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_gauge!(
        "price_stream_subscribers",
        "Number of connected realtime subscribers"
    );
    describe_counter!(
        "price_stream_connections_total",
        "Total realtime connections accepted"
    );
    describe_counter!(
        "price_stream_disconnections_total",
        "Total realtime connections closed"
    );

    describe_gauge!(
        "price_stream_scheduler_running",
        "1 while a broadcast session is running, 0 otherwise"
    );
    describe_counter!(
        "price_stream_sessions_started_total",
        "Total broadcast sessions started"
    );
    describe_counter!(
        "price_stream_ticks_total",
        "Total price updates published by the scheduler"
    );
    describe_counter!(
        "price_stream_generator_failures_total",
        "Total ticks skipped because the price source failed"
    );

    describe_counter!(
        "price_stream_updates_delivered_total",
        "Total price updates queued to subscribers"
    );
    describe_counter!(
        "price_stream_delivery_failures_total",
        "Total per-subscriber delivery failures by reason"
    );

    describe_histogram!(
        "price_stream_tick_duration_seconds",
        "Time to fan out one price update to all subscribers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an accepted connection and the resulting subscriber count.
pub fn record_connection(change: RegistryChange) {
    counter!("price_stream_connections_total").increment(1);
    record_change(change);
}

/// Record a closed connection and the resulting subscriber count.
pub fn record_disconnection(change: RegistryChange) {
    counter!("price_stream_disconnections_total").increment(1);
    record_change(change);
}

/// Record a forced shutdown of the registry: no subscribers, no session.
pub fn record_shutdown(dropped: usize) {
    counter!("price_stream_disconnections_total").increment(dropped as u64);
    gauge!("price_stream_subscribers").set(0.0);
    gauge!("price_stream_scheduler_running").set(0.0);
}

#[allow(clippy::cast_precision_loss)]
fn record_change(change: RegistryChange) {
    gauge!("price_stream_subscribers").set(change.active as f64);
    match change.transition {
        RegistryTransition::Started => {
            counter!("price_stream_sessions_started_total").increment(1);
            gauge!("price_stream_scheduler_running").set(1.0);
        }
        RegistryTransition::Stopped => {
            gauge!("price_stream_scheduler_running").set(0.0);
        }
        RegistryTransition::Joined | RegistryTransition::Left | RegistryTransition::Ignored => {}
    }
}

/// Record the outcome of one broadcast.
pub fn record_delivery(report: &DeliveryReport) {
    counter!("price_stream_ticks_total").increment(1);
    counter!("price_stream_updates_delivered_total").increment(report.delivered as u64);
    if report.lagged > 0 {
        counter!("price_stream_delivery_failures_total", "reason" => "lagged")
            .increment(report.lagged as u64);
    }
    if report.closed > 0 {
        counter!("price_stream_delivery_failures_total", "reason" => "closed")
            .increment(report.closed as u64);
    }
}

/// Record a skipped tick.
pub fn record_generator_failure(error: &PriceSourceError) {
    let kind = match error {
        PriceSourceError::NoInstruments => "no_instruments",
        PriceSourceError::NonFinite { .. } => "non_finite",
        PriceSourceError::Unavailable { .. } => "unavailable",
    };
    counter!("price_stream_generator_failures_total", "kind" => kind).increment(1);
}

// =============================================================================
// Metered Adapters
// =============================================================================

/// [`BroadcastPort`] decorator that records delivery metrics.
pub struct MeteredBroadcast {
    inner: Arc<dyn BroadcastPort>,
}

impl MeteredBroadcast {
    /// Wrap a broadcast port.
    #[must_use]
    pub fn new(inner: Arc<dyn BroadcastPort>) -> Self {
        Self { inner }
    }
}

impl BroadcastPort for MeteredBroadcast {
    fn broadcast(&self, update: &PriceUpdate) -> DeliveryReport {
        let started = Instant::now();
        let report = self.inner.broadcast(update);
        histogram!("price_stream_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        record_delivery(&report);
        report
    }
}

/// [`PriceSource`] decorator that records generator failures.
pub struct MeteredSource<S> {
    inner: S,
}

impl<S: PriceSource> MeteredSource<S> {
    /// Wrap a price source.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: PriceSource> PriceSource for MeteredSource<S> {
    fn next(&mut self) -> Result<PriceUpdate, PriceSourceError> {
        self.inner.next().inspect_err(record_generator_failure)
    }

    fn instruments(&self) -> Vec<Instrument> {
        self.inner.instruments()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{MockBroadcastPort, MockPriceSource};

    fn update() -> PriceUpdate {
        PriceUpdate::new(Instrument::new("AAPL").unwrap(), Decimal::from(100))
    }

    #[test]
    fn metered_broadcast_passes_report_through() {
        let mut inner = MockBroadcastPort::new();
        inner.expect_broadcast().times(1).returning(|_| DeliveryReport {
            delivered: 2,
            lagged: 1,
            closed: 0,
        });

        let metered = MeteredBroadcast::new(Arc::new(inner));
        let report = metered.broadcast(&update());

        assert_eq!(report.delivered, 2);
        assert_eq!(report.lagged, 1);
    }

    #[test]
    fn metered_source_passes_errors_through() {
        let mut inner = MockPriceSource::new();
        inner
            .expect_next()
            .times(1)
            .returning(|| Err(PriceSourceError::NoInstruments));
        inner.expect_instruments().returning(Vec::new);

        let mut metered = MeteredSource::new(inner);
        assert_eq!(metered.next(), Err(PriceSourceError::NoInstruments));
        assert!(metered.instruments().is_empty());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_connection(RegistryChange {
            transition: RegistryTransition::Started,
            active: 1,
        });
        record_disconnection(RegistryChange {
            transition: RegistryTransition::Stopped,
            active: 0,
        });
        record_shutdown(2);
        record_delivery(&DeliveryReport::default());
        record_generator_failure(&PriceSourceError::NoInstruments);
    }
}
