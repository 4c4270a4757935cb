//! NetWatch Common Library
//!
//! Shared data model and utilities for the network reachability monitoring
//! engine:
//!
//! - [`model`] — topology types (`Device`, `Area`, `Link`, `Thresholds`) and
//!   the ephemeral/durable status types derived from probes.
//! - [`time`] — epoch-millisecond helpers shared across components.
//! - [`error`] — common error type.

pub mod error;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::*;
pub use time::current_timestamp_millis;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration, shared by every binary in the workspace.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): human-readable text format
/// - `LogFormat::Json`: structured JSON format for log aggregation
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("failed to initialize tracing: {e}")))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("failed to initialize tracing: {e}")))?;
        }
    }

    Ok(())
}
