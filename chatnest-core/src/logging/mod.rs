//! Logging for ChatNest
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a plain or JSON
//! formatter. `RUST_LOG` overrides the configured level when set.
//!
//! Invitation tokens and signing secrets must never appear in log fields;
//! log invitation ids instead.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Build from the `[logging]` section of the application config
    pub fn from_settings(settings: &LoggingConfig) -> Result<Self, LoggingError> {
        Ok(Self {
            level: settings.level.parse()?,
            with_timestamp: settings.with_timestamp,
            with_target: settings.with_target,
            json_format: settings.json_format,
        })
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Filter used when `RUST_LOG` is not set
    ///
    /// HTTP and pool internals are capped at `warn` unless tracing.
    fn default_filter(&self) -> EnvFilter {
        let level = self.level.as_str();
        if self.level == LogLevel::Trace {
            EnvFilter::new(level)
        } else {
            EnvFilter::new(format!("{level},hyper=warn,r2d2=warn"))
        }
    }
}

/// Initialize logging with the default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with a custom configuration
///
/// Fails if a global subscriber is already installed.
///
/// # Example
/// ```no_run
/// use chatnest_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).json_format(true);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.default_filter());

    // stdout is reserved for command output
    let layer = match (config.json_format, config.with_timestamp) {
        (true, true) => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(config.with_target)
            .boxed(),
        (true, false) => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(config.with_target)
            .boxed(),
        (false, true) => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.with_target)
            .boxed(),
        (false, false) => fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(config.with_target)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
