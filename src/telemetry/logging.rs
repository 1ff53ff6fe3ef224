//! Logging initialization for cache diagnostics.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! embedding application's call. `init_logging` is the stock wiring for
//! hosts that do not bring their own: JSON to stderr by default, pretty
//! printing for development, filter and format taken from `MODELCACHE_*`
//! environment variables via [`LogConfig::from_env`].

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive set (e.g. "info", "modelcache=debug").
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Configuration from `MODELCACHE_LOG_FORMAT` / `MODELCACHE_LOG_LEVEL`.
    ///
    /// Unrecognized or missing values fall back to the defaults, matching
    /// the rest of the env configuration surface.
    pub fn from_env() -> Self {
        let format = match std::env::var("MODELCACHE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        let level = std::env::var("MODELCACHE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self { format, level }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter {0:?}: {1}")]
    InvalidFilter(String, String),
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber for cache diagnostics.
///
/// Call once at startup, before the registry emits anything. Fails if the
/// host already installed its own subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(config.level.clone(), e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}
