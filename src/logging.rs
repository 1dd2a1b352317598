//! Logging setup
//!
//! Notifiers log through `tracing`. This module installs the subscriber
//! that prints those events; `RUST_LOG` overrides the configured level.

use tracing_subscriber::EnvFilter;

use crate::error::AppConfigError;

/// Logging settings derived from the application config
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Lower the default level to `debug`
    pub debug: bool,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> &'static str {
        if self.debug {
            "alert_receivers=debug,info"
        } else {
            "info"
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppConfigError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| AppConfigError::Logging(e.to_string()))
}
