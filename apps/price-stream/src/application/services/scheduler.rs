//! Broadcast Scheduler
//!
//! Owns the single repeating timer that pulls a price update from the
//! [`PriceSource`] and hands it to the [`BroadcastPort`] on every tick.
//!
//! # Lifecycle
//!
//! ```text
//!            start(interval)
//!  Stopped ──────────────────► Running
//!     ▲                           │
//!     └───────── stop() ──────────┘
//! ```
//!
//! A running scheduler has exactly one broadcast session: a Tokio task driven
//! by `tokio::time::interval` and a `CancellationToken`. Ticks run inline on
//! that task, so they never overlap and every subscriber sees updates in the
//! order they were generated. `stop()` cancels the token; the session checks
//! cancellation before every tick, so no tick begins after `stop()` returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BroadcastPort, PriceSource};
use crate::domain::pricing::Instrument;
use crate::domain::session::SchedulerState;

/// Smallest tick interval a session will run with.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

type SharedSource = Arc<Mutex<Box<dyn PriceSource>>>;

// =============================================================================
// Counters
// =============================================================================

#[derive(Debug, Default)]
struct SchedulerCounters {
    ticks: AtomicU64,
    generator_failures: AtomicU64,
    sessions_started: AtomicU64,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    /// Current state.
    pub state: SchedulerState,
    /// Interval of the running session, if any.
    pub tick_interval_ms: Option<u64>,
    /// Ticks that produced and published an update.
    pub ticks: u64,
    /// Ticks skipped because the price source failed.
    pub generator_failures: u64,
    /// Sessions started since creation.
    pub sessions_started: u64,
}

// =============================================================================
// Broadcast Session
// =============================================================================

/// The running instance of the scheduler.
struct BroadcastSession {
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Periodic price broadcaster with idempotent start/stop.
///
/// Must be used from within a Tokio runtime: `start` spawns the session task.
pub struct BroadcastScheduler {
    source: SharedSource,
    sink: Arc<dyn BroadcastPort>,
    session: Option<BroadcastSession>,
    counters: Arc<SchedulerCounters>,
}

impl BroadcastScheduler {
    /// Create a stopped scheduler.
    ///
    /// The source is kept for the scheduler's whole lifetime, so its state
    /// carries over from one session to the next.
    #[must_use]
    pub fn new(source: Box<dyn PriceSource>, sink: Arc<dyn BroadcastPort>) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            sink,
            session: None,
            counters: Arc::new(SchedulerCounters::default()),
        }
    }

    /// Start a broadcast session ticking every `interval`.
    ///
    /// Returns `false` without side effects if a session is already running.
    pub fn start(&mut self, interval: Duration) -> bool {
        if let Some(session) = &self.session {
            tracing::debug!(
                interval_ms = duration_millis(session.interval),
                "Broadcast session already running"
            );
            return false;
        }

        let interval = interval.max(MIN_TICK_INTERVAL);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            Arc::clone(&self.counters),
            interval,
            cancel.clone(),
        ));

        self.counters.sessions_started.fetch_add(1, Ordering::Relaxed);
        self.session = Some(BroadcastSession {
            interval,
            cancel,
            handle,
        });

        tracing::info!(interval_ms = duration_millis(interval), "Broadcast session started");
        true
    }

    /// Stop the running session.
    ///
    /// Returns `false` without side effects if no session is running.
    pub fn stop(&mut self) -> bool {
        self.halt().is_some()
    }

    /// Stop the running session and hand back its task.
    ///
    /// Awaiting the returned handle waits for a tick that was already in
    /// flight to finish. Returns `None` if no session was running.
    pub fn halt(&mut self) -> Option<JoinHandle<()>> {
        let session = self.session.take()?;
        session.cancel.cancel();
        tracing::info!(
            interval_ms = duration_millis(session.interval),
            ticks = self.counters.ticks.load(Ordering::Relaxed),
            "Broadcast session stopped"
        );
        Some(session.handle)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        if self.session.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Check if a session is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Instruments the price source covers.
    #[must_use]
    pub fn instruments(&self) -> Vec<Instrument> {
        self.source.lock().instruments()
    }

    /// Point-in-time statistics.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state(),
            tick_interval_ms: self.session.as_ref().map(|s| duration_millis(s.interval)),
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            generator_failures: self.counters.generator_failures.load(Ordering::Relaxed),
            sessions_started: self.counters.sessions_started.load(Ordering::Relaxed),
        }
    }
}

impl Drop for BroadcastScheduler {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}

// =============================================================================
// Session Task
// =============================================================================

async fn run_session(
    source: SharedSource,
    sink: Arc<dyn BroadcastPort>,
    counters: Arc<SchedulerCounters>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!("Broadcast session cancelled");
                break;
            }
            _ = ticker.tick() => {
                run_tick(&source, sink.as_ref(), &counters);
            }
        }
    }
}

fn run_tick(source: &SharedSource, sink: &dyn BroadcastPort, counters: &SchedulerCounters) {
    // Guard dropped before fan-out.
    let next = source.lock().next();

    match next {
        Ok(update) => {
            let report = sink.broadcast(&update);
            counters.ticks.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                instrument = %update.instrument,
                price = %update.price,
                delivered = report.delivered,
                failed = report.failed(),
                "Tick published"
            );
        }
        Err(e) => {
            counters.generator_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Price source failed, skipping tick");
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{
        DeliveryReport, MockBroadcastPort, MockPriceSource, PriceSourceError,
    };
    use crate::domain::pricing::PriceUpdate;
    use crate::infrastructure::price_feed::{RandomWalkConfig, RandomWalkGenerator};

    const TICK: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<PriceUpdate>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.updates.lock().len()
        }
    }

    impl BroadcastPort for RecordingSink {
        fn broadcast(&self, update: &PriceUpdate) -> DeliveryReport {
            self.updates.lock().push(update.clone());
            DeliveryReport {
                delivered: 1,
                ..DeliveryReport::default()
            }
        }
    }

    fn generator(seed: u64) -> RandomWalkGenerator {
        RandomWalkGenerator::with_seed(
            RandomWalkConfig {
                instruments: vec![
                    Instrument::new("AAPL").unwrap(),
                    Instrument::new("MSFT").unwrap(),
                ],
                initial_price: Decimal::from(100),
                volatility: 0.02,
            },
            seed,
        )
    }

    fn scheduler(sink: &Arc<RecordingSink>) -> BroadcastScheduler {
        BroadcastScheduler::new(Box::new(generator(1)), Arc::clone(sink) as Arc<dyn BroadcastPort>)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_stopped() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = scheduler(&sink);

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.snapshot().tick_interval_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_fires_after_one_interval() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        assert!(scheduler.start(TICK));
        tokio::time::sleep(TICK / 2).await;
        assert_eq!(sink.count(), 0);

        tokio::time::sleep(TICK).await;
        assert_eq!(sink.count(), 1);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_single_timer() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        assert!(scheduler.start(TICK));
        assert!(!scheduler.start(TICK));
        assert!(!scheduler.start(Duration::from_millis(10)));

        tokio::time::sleep(TICK * 3 + TICK / 2).await;

        assert_eq!(sink.count(), 3);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.tick_interval_ms, Some(100));
        assert_eq!(snapshot.ticks, 3);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn double_stop_is_noop() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        assert!(!scheduler.stop());

        scheduler.start(TICK);
        assert!(scheduler.stop());
        let after_first = scheduler.snapshot();
        assert!(!scheduler.stop());
        let after_second = scheduler.snapshot();

        assert_eq!(after_first, after_second);
        assert_eq!(after_second.state, SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_after_stop() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        scheduler.start(TICK);
        tokio::time::sleep(TICK + TICK / 2).await;
        assert_eq!(sink.count(), 1);

        let handle = scheduler.halt().unwrap();
        handle.await.unwrap();

        tokio::time::sleep(TICK * 10).await;
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_continues_price_sequence() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        scheduler.start(TICK);
        tokio::time::sleep(TICK + TICK / 2).await;
        scheduler.stop();

        scheduler.start(TICK);
        tokio::time::sleep(TICK + TICK / 2).await;
        scheduler.stop();

        let mut reference = generator(1);
        let expected: Vec<Decimal> = (0..2).map(|_| reference.next().unwrap().price).collect();
        let updates = sink.updates.lock().clone();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].instrument.as_str(), "AAPL");
        assert_eq!(updates[1].instrument.as_str(), "MSFT");
        assert_eq!(
            updates.iter().map(|u| u.price).collect::<Vec<_>>(),
            expected
        );
        assert_eq!(scheduler.snapshot().sessions_started, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_published_in_generation_order() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        scheduler.start(TICK);
        tokio::time::sleep(TICK * 10 + TICK / 2).await;
        scheduler.stop();

        let mut reference = generator(1);
        let updates = sink.updates.lock().clone();
        assert_eq!(updates.len(), 10);
        for update in updates {
            let expected = reference.next().unwrap();
            assert_eq!(update.instrument, expected.instrument);
            assert_eq!(update.price, expected.price);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generator_failure_skips_tick_and_keeps_running() {
        let mut source = MockPriceSource::new();
        let mut calls = 0;
        source.expect_next().returning(move || {
            calls += 1;
            if calls == 1 {
                Err(PriceSourceError::Unavailable {
                    message: "upstream down".to_string(),
                })
            } else {
                Ok(PriceUpdate::new(
                    Instrument::new("AAPL").unwrap(),
                    Decimal::from(100),
                ))
            }
        });

        let mut sink = MockBroadcastPort::new();
        sink.expect_broadcast()
            .times(2)
            .returning(|_| DeliveryReport::default());

        let mut scheduler = BroadcastScheduler::new(Box::new(source), Arc::new(sink));
        scheduler.start(TICK);
        tokio::time::sleep(TICK * 3 + TICK / 2).await;

        assert!(scheduler.is_running());
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.generator_failures, 1);
        assert_eq!(snapshot.ticks, 2);

        scheduler.halt().unwrap().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(&sink);

        assert!(scheduler.start(Duration::ZERO));
        assert_eq!(scheduler.snapshot().tick_interval_ms, Some(1));
        tokio::time::sleep(Duration::from_millis(5) + Duration::from_micros(500)).await;
        assert_eq!(sink.count(), 5);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn instruments_come_from_source() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = scheduler(&sink);

        let tickers: Vec<String> = scheduler
            .instruments()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    }
}
