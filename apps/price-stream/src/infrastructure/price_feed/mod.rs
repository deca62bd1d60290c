//! Synthetic Price Feed
//!
//! Random-walk price generator implementing [`PriceSource`].
//!
//! Each call advances one instrument, cycling round-robin through the
//! configured set, so a tick always yields exactly one update. Last prices
//! live in the generator, so every subscriber observes the same sequence and
//! prices carry over when the broadcast session is restarted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::domain::pricing::{Instrument, PriceUpdate, step_price};

/// Configuration for the random-walk generator.
#[derive(Debug, Clone)]
pub struct RandomWalkConfig {
    /// Instruments to generate prices for.
    pub instruments: Vec<Instrument>,
    /// Starting price for every instrument.
    pub initial_price: Decimal,
    /// Maximum fractional move per step (0.01 = ±1%).
    ///
    /// The sign is ignored, values above 1 are clamped to 1 and non-finite
    /// values disable the walk.
    pub volatility: f64,
}

/// Random-walk price generator.
#[derive(Debug)]
pub struct RandomWalkGenerator {
    instruments: Vec<Instrument>,
    prices: Vec<Decimal>,
    volatility: f64,
    cursor: usize,
    rng: StdRng,
}

impl RandomWalkGenerator {
    /// Create a generator seeded from OS entropy.
    #[must_use]
    pub fn new(config: RandomWalkConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Create a generator with a fixed seed (reproducible sequences).
    #[must_use]
    pub fn with_seed(config: RandomWalkConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RandomWalkConfig, rng: StdRng) -> Self {
        let prices = vec![config.initial_price; config.instruments.len()];
        Self {
            instruments: config.instruments,
            prices,
            volatility: sanitize_volatility(config.volatility),
            cursor: 0,
            rng,
        }
    }

    /// Last generated (or initial) price for an instrument.
    #[must_use]
    pub fn last_price(&self, instrument: &Instrument) -> Option<Decimal> {
        self.instruments
            .iter()
            .position(|i| i == instrument)
            .map(|idx| self.prices[idx])
    }
}

fn sanitize_volatility(volatility: f64) -> f64 {
    if volatility.is_finite() {
        volatility.abs().min(1.0)
    } else {
        0.0
    }
}

impl PriceSource for RandomWalkGenerator {
    fn next(&mut self) -> Result<PriceUpdate, PriceSourceError> {
        if self.instruments.is_empty() {
            return Err(PriceSourceError::NoInstruments);
        }

        let idx = self.cursor;
        self.cursor = (self.cursor + 1) % self.instruments.len();

        let shock = if self.volatility > 0.0 {
            self.rng.random_range(-self.volatility..=self.volatility)
        } else {
            0.0
        };

        let instrument = &self.instruments[idx];
        let price =
            step_price(self.prices[idx], shock).ok_or_else(|| PriceSourceError::NonFinite {
                instrument: instrument.to_string(),
            })?;
        self.prices[idx] = price;

        Ok(PriceUpdate::new(instrument.clone(), price))
    }

    fn instruments(&self) -> Vec<Instrument> {
        self.instruments.clone()
    }
}
