//! Price Stream Configuration Settings
//!
//! Configuration types for the price stream, loaded from environment variables.
//!
//! Unparseable numbers fall back to their defaults. Values that parse but make
//! no sense (a zero tick interval, a price that rounds to zero, a socket path
//! that shadows a built-in route) are rejected.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::pricing::{Instrument, InstrumentError};
use crate::infrastructure::http::RESERVED_PATHS;
use crate::infrastructure::price_feed::RandomWalkConfig;

/// Default instrument set.
pub const DEFAULT_INSTRUMENTS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Port shared by the HTTP endpoints and the WebSocket channel.
    pub port: u16,
    /// Route the WebSocket channel is mounted on.
    pub socket_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 4000,
            socket_path: "/ws".to_string(),
        }
    }
}

/// Broadcast settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// Outbound queue capacity per subscriber.
    pub subscriber_buffer: usize,
    /// WebSocket keepalive ping interval.
    pub ping_interval: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(5000),
            subscriber_buffer: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Price generator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    /// Instruments to publish prices for.
    pub instruments: Vec<Instrument>,
    /// Starting price for every instrument.
    pub initial_price: Decimal,
    /// Maximum fractional move per tick.
    pub volatility: f64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            instruments: DEFAULT_INSTRUMENTS
                .iter()
                .filter_map(|t| Instrument::new(t).ok())
                .collect(),
            initial_price: Decimal::new(10_000, 2),
            volatility: 0.01,
        }
    }
}

impl GeneratorSettings {
    /// Build the random-walk generator configuration.
    #[must_use]
    pub fn random_walk(&self) -> RandomWalkConfig {
        RandomWalkConfig {
            instruments: self.instruments.clone(),
            initial_price: self.initial_price,
            volatility: self.volatility,
        }
    }
}

/// Complete price stream configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamConfig {
    /// Server settings.
    pub server: ServerSettings,
    /// Broadcast settings.
    pub broadcast: BroadcastSettings,
    /// Price generator settings.
    pub generator: GeneratorSettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value outside its valid range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value outside its valid range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let server_defaults = ServerSettings::default();
        let broadcast_defaults = BroadcastSettings::default();
        let generator_defaults = GeneratorSettings::default();

        let port = env
            .parse("PRICE_STREAM_PORT")
            .or_else(|| env.parse("PORT"))
            .unwrap_or(server_defaults.port);

        let socket_path = env
            .string("PRICE_STREAM_SOCKET_PATH")
            .unwrap_or(server_defaults.socket_path);
        validate_socket_path(&socket_path)?;

        let tick_ms: u64 = env.parse("PRICE_STREAM_TICK_INTERVAL_MS").unwrap_or(
            u64::try_from(broadcast_defaults.tick_interval.as_millis()).unwrap_or(u64::MAX),
        );
        if tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_STREAM_TICK_INTERVAL_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let subscriber_buffer = env
            .parse("PRICE_STREAM_SUBSCRIBER_BUFFER")
            .unwrap_or(broadcast_defaults.subscriber_buffer)
            .max(1);

        let ping_interval = env
            .parse::<u64>("PRICE_STREAM_PING_INTERVAL_SECS")
            .map_or(broadcast_defaults.ping_interval, Duration::from_secs);
        if ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_STREAM_PING_INTERVAL_SECS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let instruments = match env.string("PRICE_STREAM_INSTRUMENTS") {
            Some(raw) => parse_instruments(&raw)?,
            None => generator_defaults.instruments,
        };

        let initial_price = env
            .parse::<Decimal>("PRICE_STREAM_INITIAL_PRICE")
            .unwrap_or(generator_defaults.initial_price)
            .round_dp(2);
        if initial_price <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_STREAM_INITIAL_PRICE".to_string(),
                reason: "must be at least 0.01".to_string(),
            });
        }

        let volatility = env
            .parse::<f64>("PRICE_STREAM_VOLATILITY")
            .unwrap_or(generator_defaults.volatility);
        if !(0.0..1.0).contains(&volatility) {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_STREAM_VOLATILITY".to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }

        Ok(Self {
            server: ServerSettings { port, socket_path },
            broadcast: BroadcastSettings {
                tick_interval: Duration::from_millis(tick_ms),
                subscriber_buffer,
                ping_interval,
            },
            generator: GeneratorSettings {
                instruments,
                initial_price,
                volatility,
            },
        })
    }
}

/// Configuration error.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value outside its valid range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.string(key).and_then(|v| v.parse().ok())
    }
}

fn validate_socket_path(path: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: "PRICE_STREAM_SOCKET_PATH".to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if RESERVED_PATHS.contains(&path) {
        return Err(invalid("collides with a built-in route"));
    }
    if path.contains([':', '{', '}', '*']) {
        return Err(invalid("must be a static path"));
    }
    Ok(())
}

fn parse_instruments(raw: &str) -> Result<Vec<Instrument>, ConfigError> {
    let mut instruments: Vec<Instrument> = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let instrument = Instrument::new(part).map_err(|e: InstrumentError| {
            ConfigError::InvalidValue {
                key: "PRICE_STREAM_INSTRUMENTS".to_string(),
                reason: e.to_string(),
            }
        })?;
        if !instruments.contains(&instrument) {
            instruments.push(instrument);
        }
    }

    if instruments.is_empty() {
        return Err(ConfigError::EmptyValue("PRICE_STREAM_INSTRUMENTS".to_string()));
    }
    Ok(instruments)
}
