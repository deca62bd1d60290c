//! Pricing Types
//!
//! Instruments and the immutable price update value emitted once per tick.
//! Also holds the pure random-walk step used by the synthetic generator.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Smallest price a random walk can reach.
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Fractional digits kept on every generated price.
pub const PRICE_SCALE: u32 = 2;

// =============================================================================
// Instrument
// =============================================================================

/// A tracked instrument identifier (ticker symbol).
///
/// Always upper-case and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Instrument(String);

impl Instrument {
    /// Create a new instrument from a ticker.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::Empty` if the ticker is blank.
    pub fn new(ticker: impl AsRef<str>) -> Result<Self, InstrumentError> {
        let trimmed = ticker.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InstrumentError::Empty);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Get the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Instrument {
    type Error = InstrumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Instrument> for String {
    fn from(instrument: Instrument) -> Self {
        instrument.0
    }
}

/// Instrument validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    /// Ticker was empty or whitespace.
    #[error("instrument ticker cannot be empty")]
    Empty,
}

// =============================================================================
// Price Update
// =============================================================================

/// One price observation for one instrument.
///
/// Produced by a price source, fanned out to every subscriber, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Instrument this price belongs to.
    pub instrument: Instrument,
    /// Price, rounded to [`PRICE_SCALE`] digits.
    pub price: Decimal,
    /// When the price was generated.
    pub timestamp: DateTime<Utc>,
}

impl PriceUpdate {
    /// Create a price update stamped with the current time.
    #[must_use]
    pub fn new(instrument: Instrument, price: Decimal) -> Self {
        Self {
            instrument,
            price,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Random Walk
// =============================================================================

/// Apply one multiplicative random-walk step to `previous`.
///
/// The result is `previous * (1 + shock)`, rounded to [`PRICE_SCALE`] digits
/// and floored at [`MIN_PRICE`]. Returns `None` when `shock` is not finite.
#[must_use]
pub fn step_price(previous: Decimal, shock: f64) -> Option<Decimal> {
    if !shock.is_finite() {
        return None;
    }
    let factor = Decimal::try_from(1.0 + shock).ok()?;
    let next = previous.checked_mul(factor)?.round_dp(PRICE_SCALE);
    Some(next.max(MIN_PRICE))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn instrument_is_uppercased_and_trimmed() {
        let instrument = Instrument::new("  aapl ").unwrap();
        assert_eq!(instrument.as_str(), "AAPL");
        assert_eq!(instrument.to_string(), "AAPL");
    }

    #[test]
    fn blank_instrument_rejected() {
        assert_eq!(Instrument::new("   "), Err(InstrumentError::Empty));
        assert_eq!(Instrument::new(""), Err(InstrumentError::Empty));
    }

    #[test]
    fn instrument_deserialization_validates() {
        let ok: Instrument = serde_json::from_str("\"msft\"").unwrap();
        assert_eq!(ok.as_str(), "MSFT");

        let err = serde_json::from_str::<Instrument>("\"\"");
        assert!(err.is_err());
    }

    #[test]
    fn price_update_serializes_price_as_string() {
        let update = PriceUpdate::new(
            Instrument::new("AAPL").unwrap(),
            Decimal::from_str("187.42").unwrap(),
        );
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(json["instrument"], "AAPL");
        assert_eq!(json["price"], "187.42");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn step_price_applies_shock() {
        let previous = Decimal::from(100);
        assert_eq!(step_price(previous, 0.01), Some(Decimal::from(101)));
        assert_eq!(step_price(previous, -0.01), Some(Decimal::from(99)));
        assert_eq!(step_price(previous, 0.0), Some(Decimal::from(100)));
    }

    #[test]
    fn step_price_rounds_to_cents() {
        let previous = Decimal::from_str("10.00").unwrap();
        let next = step_price(previous, 0.001_234).unwrap();
        assert_eq!(next, Decimal::from_str("10.01").unwrap());
        assert!(next.scale() <= PRICE_SCALE);
    }

    #[test]
    fn step_price_never_below_floor() {
        let previous = Decimal::from_str("0.01").unwrap();
        assert_eq!(step_price(previous, -0.99), Some(MIN_PRICE));
    }

    #[test]
    fn step_price_rejects_non_finite_shock() {
        let previous = Decimal::from(100);
        assert_eq!(step_price(previous, f64::NAN), None);
        assert_eq!(step_price(previous, f64::INFINITY), None);
    }
}
