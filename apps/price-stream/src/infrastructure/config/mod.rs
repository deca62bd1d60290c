//! Configuration Module
//!
//! Configuration loading for the price stream service.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, DEFAULT_INSTRUMENTS, GeneratorSettings, ServerSettings,
    StreamConfig,
};
