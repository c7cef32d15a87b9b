//! Logging setup
//!
//! The engine only emits `tracing` events; hosts that want them on stderr call
//! [`init_logging`] once (directly or through `init_logging_ffi`).

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_targets: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }
}

/// Install a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails (rather than
/// panicking) when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_targets)
        .with_writer(std::io::stderr);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EngineError::Logging(e.to_string()))?;
    tracing::debug!(level = %config.level, json = config.json_format, "logging initialized");
    Ok(())
}
